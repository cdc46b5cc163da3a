//! r-moviecast library core functionality

pub mod backend;
pub mod cast;
pub mod config;
pub mod player;
pub mod progress;
pub mod subtitle;
pub mod ui;

/// Initialize the application directories
pub fn init_app_dirs() -> std::io::Result<()> {
    let default_path = config::Settings::default_path();
    if let Some(config_dir) = default_path.parent() {
        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
        }
    }
    Ok(())
}
