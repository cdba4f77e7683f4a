//! Gym alarm settings.
//!
//! Settings persist across sessions (see `storage::SettingsStore`);
//! a verification session copies the values it needs at `start()` so a
//! mid-cycle edit never alters an in-flight cycle.

use chrono::{DateTime, Duration, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::geo::Coordinates;

/// Nominal alarm trigger time of day, stored as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GymTime {
    hour: u8,
    minute: u8,
}

impl GymTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ConfigError> {
        if hour > 23 || minute > 59 {
            return Err(ConfigError::InvalidValue {
                key: "gym_time".into(),
                message: format!("{hour:02}:{minute:02} is not a valid time of day"),
            });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Next wall-clock occurrence of this time: today if still ahead,
    /// otherwise tomorrow.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now
            .date_naive()
            .and_hms_opt(self.hour.into(), self.minute.into(), 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now); // Hour/minute validated at construction.
        if today <= now {
            today + Duration::days(1)
        } else {
            today
        }
    }
}

impl fmt::Display for GymTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for GymTime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTime(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        GymTime::new(hour, minute).map_err(|_| invalid())
    }
}

impl Serialize for GymTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GymTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// User-facing gym alarm configuration.
///
/// Serialized to/from TOML at `~/.config/gymgate/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymSettings {
    /// Nominal alarm trigger time.
    #[serde(default = "default_gym_time")]
    pub gym_time: GymTime,
    /// Home coordinate; absence means location verification cannot run.
    #[serde(default)]
    pub home_location: Option<Coordinates>,
    /// Auto-check window after the alarm before the wake-up check elapses.
    #[serde(default = "default_wake_up_delay")]
    pub wake_up_delay_min: u32,
    /// Delay from wake-up confirmation to the location check.
    #[serde(default = "default_location_check_delay")]
    pub location_check_delay_min: u32,
    /// Maximum full retrigger cycles after a failed location check.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// "Away" means further than this from home.
    #[serde(default = "default_geofence_radius")]
    pub geofence_radius_m: f64,
}

fn default_gym_time() -> GymTime {
    GymTime { hour: 6, minute: 0 }
}
fn default_wake_up_delay() -> u32 {
    5
}
fn default_location_check_delay() -> u32 {
    15
}
fn default_max_retries() -> u32 {
    3
}
fn default_geofence_radius() -> f64 {
    100.0
}

impl Default for GymSettings {
    fn default() -> Self {
        Self {
            gym_time: default_gym_time(),
            home_location: None,
            wake_up_delay_min: default_wake_up_delay(),
            location_check_delay_min: default_location_check_delay(),
            max_retries: default_max_retries(),
            geofence_radius_m: default_geofence_radius(),
        }
    }
}

impl GymSettings {
    /// Check value ranges. Called after every settings mutation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(home) = &self.home_location {
            if !home.is_valid() {
                return Err(ConfigError::InvalidValue {
                    key: "home_location".into(),
                    message: format!(
                        "({}, {}) is not a valid coordinate",
                        home.latitude, home.longitude
                    ),
                });
            }
        }
        if !self.geofence_radius_m.is_finite() || self.geofence_radius_m <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "geofence_radius_m".into(),
                message: format!("{} is not a positive radius", self.geofence_radius_m),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn gym_time_parse_and_format() {
        let t: GymTime = "06:30".parse().unwrap();
        assert_eq!(t.hour(), 6);
        assert_eq!(t.minute(), 30);
        assert_eq!(t.to_string(), "06:30");
        assert!("24:00".parse::<GymTime>().is_err());
        assert!("6".parse::<GymTime>().is_err());
        assert!("ab:cd".parse::<GymTime>().is_err());
    }

    #[test]
    fn next_occurrence_today_when_still_ahead() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap();
        let t = GymTime::new(6, 0).unwrap();
        let fires = t.next_occurrence(now);
        assert_eq!(fires, Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_occurrence_tomorrow_when_already_past() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0).unwrap();
        let t = GymTime::new(6, 0).unwrap();
        let fires = t.next_occurrence(now);
        assert_eq!(fires, Utc.with_ymd_and_hms(2025, 3, 11, 6, 0, 0).unwrap());
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = GymSettings::default();
        assert_eq!(s.gym_time.to_string(), "06:00");
        assert!(s.home_location.is_none());
        assert_eq!(s.wake_up_delay_min, 5);
        assert_eq!(s.location_check_delay_min, 15);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.geofence_radius_m, 100.0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let s: GymSettings = toml::from_str("gym_time = \"05:45\"").unwrap();
        assert_eq!(s.gym_time.to_string(), "05:45");
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.geofence_radius_m, 100.0);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut s = GymSettings::default();
        s.geofence_radius_m = 0.0;
        assert!(s.validate().is_err());

        let mut s = GymSettings::default();
        s.home_location = Some(Coordinates::new(95.0, 0.0));
        assert!(s.validate().is_err());

        assert!(GymSettings::default().validate().is_ok());
    }

    #[test]
    fn toml_roundtrip() {
        let mut s = GymSettings::default();
        s.home_location = Some(Coordinates::new(35.6812, 139.7671));
        let text = toml::to_string_pretty(&s).unwrap();
        let parsed: GymSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, s);
    }
}
