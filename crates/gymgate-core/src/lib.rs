//! # Gymgate Core Library
//!
//! Core business logic for the gymgate gym-attendance alarm. It
//! implements a CLI-first philosophy where every operation is available
//! via a standalone CLI binary; any GUI would be a thin layer over the
//! same library.
//!
//! ## Architecture
//!
//! - **Verification session**: a wall-clock state machine driving the
//!   alarm → wake-up check → location check pipeline, with a bounded
//!   retry loop when the check finds the user still at home
//! - **Session manager**: owns live sessions and performs their side
//!   effects (timers, notifications, persistence)
//! - **Storage**: SQLite-based session persistence and TOML-based
//!   settings
//! - **Collaborator seams**: clock, notification gateway and location
//!   provider are traits, with deterministic test doubles
//!
//! ## Key Components
//!
//! - [`VerificationSession`]: the state machine proper
//! - [`SessionManager`]: orchestration and recovery
//! - [`SessionDb`] / [`SettingsStore`]: persistence
//! - [`Event`]: the record of every state change

pub mod clock;
pub mod error;
pub mod events;
pub mod geo;
pub mod location;
pub mod notify;
pub mod retry;
pub mod session;
pub mod settings;
pub mod storage;

pub use clock::{ManualClock, SessionClock, TimerKey, TokioClock};
pub use error::{ConfigError, CoreError, SessionError, StorageError};
pub use events::Event;
pub use geo::{Coordinates, Presence};
pub use location::{FixedLocation, LocationError, LocationProvider, NoLocation};
pub use notify::{ConsoleNotifier, NotificationGateway, NotificationPayload};
pub use session::{
    AttendanceOutcome, SessionId, SessionManager, SessionSnapshot, Stage, VerificationSession,
};
pub use settings::{GymSettings, GymTime};
pub use storage::{SessionDb, SettingsStore};
