//! Verification sessions.
//!
//! `machine` is the state machine proper; `manager` owns the live
//! sessions, wires in the clock/notifier/location collaborators and
//! persists a snapshot after every transition.

mod machine;
mod manager;

pub use machine::{
    ArmedTimer, AttendanceOutcome, LocationReadDisposition, SessionSnapshot, Stage, TimerPurpose,
    VerificationSession,
};
pub use manager::SessionManager;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one verification session (one per day/cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
