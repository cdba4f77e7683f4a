use clap::Subcommand;
use gymgate_core::geo::{self, Presence};
use gymgate_core::{Coordinates, SettingsStore};

use super::CliResult;

#[derive(Subcommand)]
pub enum GeoAction {
    /// Distance and presence for a coordinate against the home geofence
    Check {
        /// Current latitude in degrees
        #[arg(long)]
        lat: f64,
        /// Current longitude in degrees
        #[arg(long)]
        lon: f64,
        /// Home latitude (defaults to the stored home location)
        #[arg(long)]
        home_lat: Option<f64>,
        /// Home longitude (defaults to the stored home location)
        #[arg(long)]
        home_lon: Option<f64>,
        /// Geofence radius in meters (defaults to the stored radius)
        #[arg(long)]
        radius: Option<f64>,
    },
}

pub fn run(action: GeoAction) -> CliResult {
    match action {
        GeoAction::Check {
            lat,
            lon,
            home_lat,
            home_lon,
            radius,
        } => {
            let sample = Coordinates::new(lat, lon);
            let (home, radius_m) = match (home_lat, home_lon) {
                (Some(home_lat), Some(home_lon)) => {
                    (Coordinates::new(home_lat, home_lon), radius.unwrap_or(100.0))
                }
                _ => {
                    let settings = SettingsStore::open_default()?.load()?;
                    let home = settings
                        .home_location
                        .ok_or("no home location stored; pass --home-lat/--home-lon")?;
                    (home, radius.unwrap_or(settings.geofence_radius_m))
                }
            };

            let distance_m = geo::haversine_distance_m(sample, home);
            let presence = geo::classify(sample, home, radius_m);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "distance_m": distance_m,
                    "radius_m": radius_m,
                    "presence": presence,
                    "at_gym": presence == Presence::Away,
                }))?
            );
        }
    }
    Ok(())
}
