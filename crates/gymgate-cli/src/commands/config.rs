use clap::Subcommand;
use gymgate_core::SettingsStore;

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a settings value
    Get {
        /// Settings key (e.g. "gym_time", "home_location.latitude")
        key: String,
    },
    /// Set a settings value
    Set {
        /// Settings key
        key: String,
        /// New value (JSON for numbers/objects, plain string otherwise)
        value: String,
    },
    /// Print all settings as TOML
    List,
    /// Reset settings to defaults
    Reset,
    /// Print the settings file path
    Path,
}

pub fn run(action: ConfigAction) -> CliResult {
    let store = SettingsStore::open_default()?;
    match action {
        ConfigAction::Get { key } => match store.get(&key)? {
            Some(value) => println!("{value}"),
            None => {
                eprintln!("unknown key: {key}");
                std::process::exit(1);
            }
        },
        ConfigAction::Set { key, value } => {
            store.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List => {
            print!("{}", store.dump()?);
        }
        ConfigAction::Reset => {
            store.reset()?;
            println!("settings reset to defaults");
        }
        ConfigAction::Path => {
            println!("{}", store.path().display());
        }
    }
    Ok(())
}
