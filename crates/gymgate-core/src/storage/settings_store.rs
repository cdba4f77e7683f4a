//! TOML-backed settings storage.
//!
//! Settings live at `~/.config/gymgate/config.toml`. Read at session
//! start, written on change. Dot-path `get`/`set` drive the CLI's
//! `config` subcommand via a serde_json round trip, so new settings
//! fields need no extra plumbing here.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, CoreError};
use crate::settings::GymSettings;

use super::data_dir;

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store at the default location under the data dir.
    pub fn open_default() -> Result<Self, CoreError> {
        Ok(Self {
            path: data_dir()?.join("config.toml"),
        })
    }

    /// Store at an explicit path (tests, custom setups).
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load from disk; a missing file yields defaults, written back so
    /// the user has a file to edit.
    pub fn load(&self) -> Result<GymSettings, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let settings: GymSettings =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: self.path.clone(),
                        message: e.to_string(),
                    })?;
                settings.validate()?;
                Ok(settings)
            }
            Err(_) => {
                let settings = GymSettings::default();
                self.save(&settings)?;
                Ok(settings)
            }
        }
    }

    /// Validate and persist.
    pub fn save(&self, settings: &GymSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        let content = toml::to_string_pretty(settings).map_err(|e| ConfigError::SaveFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(|e| ConfigError::SaveFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Get a settings value as a string by dot-separated key.
    pub fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let settings = self.load()?;
        let json = serde_json::to_value(&settings)?;
        Ok(json_value_by_path(&json, key).map(|val| match val {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    /// Set a settings value by key, validate and persist. Returns the
    /// updated settings.
    pub fn set(&self, key: &str, value: &str) -> Result<GymSettings, CoreError> {
        let settings = self.load()?;
        let mut json = serde_json::to_value(&settings)?;
        set_json_value_by_path(&mut json, key, value)?;
        let updated: GymSettings =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        self.save(&updated)?;
        Ok(updated)
    }

    /// Reset to defaults.
    pub fn reset(&self) -> Result<(), ConfigError> {
        self.save(&GymSettings::default())
    }

    /// Render the current settings as TOML for display.
    pub fn dump(&self) -> Result<String, CoreError> {
        let settings = self.load()?;
        toml::to_string_pretty(&settings).map_err(|e| {
            CoreError::Config(ConfigError::LoadFailed {
                path: self.path.clone(),
                message: e.to_string(),
            })
        })
    }
}

fn json_value_by_path<'a>(
    root: &'a serde_json::Value,
    key: &str,
) -> Option<&'a serde_json::Value> {
    if key.is_empty() {
        return None;
    }
    let mut current = root;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn set_json_value_by_path(
    root: &mut serde_json::Value,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let mut parts = key.split('.').peekable();
    if parts.peek().is_none() {
        return Err(ConfigError::UnknownKey(key.to_string()));
    }

    let mut current = root;
    while let Some(part) = parts.next() {
        let is_leaf = parts.peek().is_none();
        if is_leaf {
            let obj = current
                .as_object_mut()
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            if !obj.contains_key(part) {
                return Err(ConfigError::UnknownKey(key.to_string()));
            }
            // Numbers, booleans, objects and null parse as JSON;
            // anything else (e.g. "06:30") stays a string.
            let new_value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        current = current
            .get_mut(part)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
    }

    Err(ConfigError::UnknownKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SettingsStore) {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::at(dir.path().join("config.toml"));
        (dir, store)
    }

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let (_dir, store) = store();
        let settings = store.load().unwrap();
        assert_eq!(settings, GymSettings::default());
        assert!(store.path().exists());
    }

    #[test]
    fn save_load_roundtrip() {
        let (_dir, store) = store();
        let mut settings = GymSettings::default();
        settings.max_retries = 5;
        settings.home_location = Some(crate::geo::Coordinates::new(35.68, 139.77));
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let (_dir, store) = store();
        store
            .save(&GymSettings {
                home_location: Some(crate::geo::Coordinates::new(1.5, 2.5)),
                ..GymSettings::default()
            })
            .unwrap();
        assert_eq!(store.get("gym_time").unwrap().as_deref(), Some("06:00"));
        assert_eq!(store.get("max_retries").unwrap().as_deref(), Some("3"));
        assert_eq!(
            store.get("home_location.latitude").unwrap().as_deref(),
            Some("1.5")
        );
        assert!(store.get("no_such_key").unwrap().is_none());
    }

    #[test]
    fn set_updates_number_string_and_object_values() {
        let (_dir, store) = store();
        store.load().unwrap();

        let updated = store.set("max_retries", "7").unwrap();
        assert_eq!(updated.max_retries, 7);

        let updated = store.set("gym_time", "05:45").unwrap();
        assert_eq!(updated.gym_time.to_string(), "05:45");

        let updated = store
            .set("home_location", r#"{"latitude": 35.0, "longitude": 139.0}"#)
            .unwrap();
        assert_eq!(
            updated.home_location,
            Some(crate::geo::Coordinates::new(35.0, 139.0))
        );
    }

    #[test]
    fn set_rejects_unknown_keys_and_invalid_values() {
        let (_dir, store) = store();
        store.load().unwrap();
        assert!(store.set("nonexistent", "1").is_err());
        assert!(store.set("gym_time", "not-a-time").is_err());
        // Radius must stay positive; validation runs before save.
        assert!(store.set("geofence_radius_m", "-5").is_err());
    }

    #[test]
    fn reset_restores_defaults() {
        let (_dir, store) = store();
        store.set("max_retries", "9").unwrap();
        store.reset().unwrap();
        assert_eq!(store.load().unwrap(), GymSettings::default());
    }
}
