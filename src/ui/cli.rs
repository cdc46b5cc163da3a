//! Command-line interface implementation

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;
use crate::player::{PlaybackPhase, PlayerUpdate, ResumeChoice, Surface};

/// Command-line arguments for r-moviecast
#[derive(Parser, Debug)]
#[command(author, version, about = "Headless movie playback client", long_about = None)]
pub struct Args {
    /// Media server URL
    #[arg(short, long, env = "MOVIECAST_SERVER_URL")]
    pub server_url: Option<String>,

    /// Bearer token for the media server
    #[arg(short = 't', long, env = "MOVIECAST_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Config file path
    #[arg(short, long, env = "MOVIECAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Play a media item on a simulated local surface
    Play(PlayArgs),
    /// Print a WebVTT file with every timestamp shifted
    ShiftVtt {
        file: PathBuf,
        /// Seconds; negative values move cues earlier
        #[arg(allow_negative_numbers = true)]
        offset: f64,
    },
    /// Save one playback checkpoint and wait for it
    Checkpoint {
        media_id: String,
        /// Seconds
        position: f64,
        /// Seconds
        #[arg(long)]
        duration: Option<f64>,
    },
}

#[derive(ClapArgs, Debug, PartialEq)]
pub struct PlayArgs {
    pub media_id: String,

    /// Start from the beginning instead of the saved position
    #[arg(long)]
    pub start_over: bool,

    /// Length of the simulated media in seconds
    #[arg(long)]
    pub simulate_duration: Option<f64>,
}

impl PlayArgs {
    /// The answer to give the resume prompt. Resuming is the default.
    pub fn resume_choice(&self) -> ResumeChoice {
        if self.start_over {
            ResumeChoice::StartOver
        } else {
            ResumeChoice::Resume
        }
    }
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}

impl Cli {
    pub fn new() -> Self {
        Cli { args: Args::parse() }
    }

    /// Flags and environment variables take precedence over the config file.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(url) = &self.args.server_url {
            settings.server_url = url.clone();
        }
        if let Some(token) = &self.args.access_token {
            settings.access_token = Some(token.clone());
        }
    }

    /// One line per update, `None` for updates not worth printing.
    pub fn format_update(update: &PlayerUpdate) -> Option<String> {
        let line = match update {
            PlayerUpdate::PhaseChanged(PlaybackPhase::Loading) => "Loading...".to_string(),
            PlayerUpdate::ResumePrompt {
                resume_position,
                duration,
                ..
            } => match duration {
                Some(d) => format!("Resume from {} of {}?", format_clock(*resume_position), format_clock(*d)),
                None => format!("Resume from {}?", format_clock(*resume_position)),
            },
            PlayerUpdate::SessionStarted {
                media_id,
                surface,
                start_offset,
            } => format!(
                "Playing {} on {} from {}",
                media_id,
                surface_name(*surface),
                format_clock(*start_offset)
            ),
            PlayerUpdate::Progress { position, duration, .. } => match duration {
                Some(d) => format!("{} / {}", format_clock(*position), format_clock(*d)),
                None => format_clock(*position),
            },
            PlayerUpdate::LoadFailed { media_id, error } => format!("Could not load {}: {}", media_id, error),
            PlayerUpdate::CastConnected { device_name } => {
                format!("Casting to {}", device_name.as_deref().unwrap_or("cast device"))
            }
            PlayerUpdate::CastDisconnected { last_position } => {
                format!("Cast ended at {}", format_clock(*last_position))
            }
            PlayerUpdate::CastError(message) => format!("Cast error: {}", message),
            PlayerUpdate::Ended { media_id, next_media_id } => match next_media_id {
                Some(next) => format!("Finished {}, up next: {}", media_id, next),
                None => format!("Finished {}", media_id),
            },
            PlayerUpdate::Countdown { next_media_id, remaining } => {
                format!("Playing {} in {}s", next_media_id, remaining)
            }
            PlayerUpdate::CountdownCancelled => "Auto-play cancelled".to_string(),
            PlayerUpdate::SubtitleOffsetApplied { offset_seconds, .. } => {
                format!("Subtitles shifted by {:+.1}s", offset_seconds)
            }
            PlayerUpdate::Stopped => "Stopped".to_string(),
            PlayerUpdate::PhaseChanged(_) => return None,
        };
        Some(line)
    }

    pub fn display_update(&self, update: &PlayerUpdate) {
        if let Some(line) = Self::format_update(update) {
            println!("{}", line);
        }
    }
}

fn surface_name(surface: Surface) -> &'static str {
    match surface {
        Surface::Local => "this device",
        Surface::Remote => "cast device",
    }
}

/// `h:mm:ss` or `m:ss`.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
