mod session_db;
mod settings_store;

pub use session_db::SessionDb;
pub use settings_store::SettingsStore;

use std::path::PathBuf;

/// Returns `~/.config/gymgate[-dev]/` based on GYMGATE_ENV.
///
/// Set GYMGATE_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the config directory cannot be created.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("GYMGATE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("gymgate-dev")
    } else {
        base_dir.join("gymgate")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
