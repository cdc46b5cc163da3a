use r_moviecast::backend::{MediaApiClient, MediaApiContract};
use r_moviecast::cast::UnavailableTransport;
use r_moviecast::config::Settings;
use r_moviecast::init_app_dirs;
use r_moviecast::player::{HeadlessSurface, Player, PlayerCommand, PlayerConfig, PlayerUpdate};
use r_moviecast::progress::{CheckpointClient, LocalStore};
use r_moviecast::subtitle::shift_vtt;
use r_moviecast::ui::{Cli, Command, PlayArgs};
use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::new();
    init_tracing(cli.args.log_json);

    if let Command::ShiftVtt { file, offset } = &cli.args.command {
        let text = fs::read_to_string(file)?;
        print!("{}", shift_vtt(&text, *offset)?);
        return Ok(());
    }

    init_app_dirs()?;
    let config_path = cli.args.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&config_path)?;
    cli.apply_overrides(&mut settings);
    settings.validate()?;

    let store_path = settings
        .store_path
        .clone()
        .unwrap_or_else(Settings::default_store_path);
    let store = Arc::new(LocalStore::open(&store_path)?);
    let api: Arc<dyn MediaApiContract> = Arc::new(MediaApiClient::from_settings(&settings));

    match &cli.args.command {
        Command::Checkpoint {
            media_id,
            position,
            duration,
        } => save_checkpoint(api, store, media_id, *position, *duration).await,
        Command::Play(play) => play_media(&cli, play, api, store, &settings).await,
        Command::ShiftVtt { .. } => Ok(()),
    }
}

async fn save_checkpoint(
    api: Arc<dyn MediaApiContract>,
    store: Arc<LocalStore>,
    media_id: &str,
    position: f64,
    duration: Option<f64>,
) -> Result<(), Box<dyn Error>> {
    let client = CheckpointClient::new(api.clone(), store);
    match api.get_signed_urls(media_id).await {
        Ok(urls) => client.register_endpoint(media_id, &api.resolve_url(&urls.update_position)),
        Err(e) => warn!("No signed position URL for {}, using the unsigned endpoint: {}", media_id, e),
    }

    match client.checkpoint(media_id, position, duration) {
        Some(handle) => {
            handle.await?;
            println!("Saved {} at {}s", media_id, position.floor());
        }
        None => println!("Nothing to save at position {}", position),
    }
    Ok(())
}

async fn play_media(
    cli: &Cli,
    play: &PlayArgs,
    api: Arc<dyn MediaApiContract>,
    store: Arc<LocalStore>,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {
    let surface = Arc::new(HeadlessSurface::new(Duration::from_secs(1), play.simulate_duration));
    let (mut player, commands) = Player::new(
        api,
        surface,
        Arc::new(UnavailableTransport),
        store,
        PlayerConfig::from(settings),
    );
    let mut updates = player.subscribe_state_updates();
    let player_task = tokio::spawn(async move { player.run().await });

    commands
        .send(PlayerCommand::Select {
            media_id: play.media_id.clone(),
        })
        .await?;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    cli.display_update(&update);
                    match update {
                        PlayerUpdate::ResumePrompt { .. } => {
                            commands.send(PlayerCommand::ResumeChoice(play.resume_choice())).await?;
                        }
                        PlayerUpdate::LoadFailed { .. }
                        | PlayerUpdate::Stopped
                        | PlayerUpdate::Ended { next_media_id: None, .. } => break,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} player updates", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, saving position");
                break;
            }
        }
    }

    let _ = commands.send(PlayerCommand::Shutdown).await;
    player_task.await?;
    Ok(())
}
