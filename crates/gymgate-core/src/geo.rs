//! Geofence evaluation.
//!
//! Classifies a coordinate sample as "at home" or "away" relative to a
//! circular geofence around the home coordinate. Away is interpreted as
//! gym attendance by the verification session.
//!
//! All math is pure; the session owns any state.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude within [-90, 90], longitude within [-180, 180], both finite.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Geofence classification of a location sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// Inside the geofence around the home coordinate.
    Home,
    /// Outside the geofence; treated as "at the gym".
    Away,
}

/// Great-circle distance between two coordinates in meters (haversine).
///
/// Returns 0 for identical points; always non-negative.
pub fn haversine_distance_m(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Classify a sample against the home geofence.
///
/// `Away` iff the distance from home strictly exceeds the radius.
pub fn classify(current: Coordinates, home: Coordinates, radius_m: f64) -> Presence {
    if haversine_distance_m(current, home) > radius_m {
        Presence::Away
    } else {
        Presence::Home
    }
}
