//! Location provider seam.
//!
//! A read may fail (no permission, no fix). The session treats a
//! failure during the location check as "data unavailable": one bounded
//! re-read, then the failed check falls through to the at-home branch.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::geo::Coordinates;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("no location fix available")]
    NoFix,
}

pub trait LocationProvider: Send + Sync {
    fn current_location(&self) -> Result<Coordinates, LocationError>;
}

/// Always reports the same coordinate. The CLI uses this when a
/// location is supplied via `GYMGATE_LOCATION`.
pub struct FixedLocation(Coordinates);

impl FixedLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self(coordinates)
    }
}

impl LocationProvider for FixedLocation {
    fn current_location(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// No location source wired in; every read fails.
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn current_location(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::NoFix)
    }
}

/// Pops pre-scripted results in order; for tests. Once the script is
/// exhausted, reads fail with `NoFix`.
pub struct ScriptedLocation {
    results: Mutex<VecDeque<Result<Coordinates, LocationError>>>,
}

impl ScriptedLocation {
    pub fn new(results: impl IntoIterator<Item = Result<Coordinates, LocationError>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
        }
    }
}

impl LocationProvider for ScriptedLocation {
    fn current_location(&self) -> Result<Coordinates, LocationError> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Err(LocationError::NoFix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_location_pops_in_order_then_fails() {
        let provider = ScriptedLocation::new([
            Ok(Coordinates::new(1.0, 2.0)),
            Err(LocationError::PermissionDenied),
        ]);
        assert_eq!(
            provider.current_location(),
            Ok(Coordinates::new(1.0, 2.0))
        );
        assert_eq!(
            provider.current_location(),
            Err(LocationError::PermissionDenied)
        );
        assert_eq!(provider.current_location(), Err(LocationError::NoFix));
    }
}
