//! Every state change in a verification session produces an Event.
//!
//! The CLI prints them; a GUI would poll for them. Events carrying a
//! `fires_at` correspond to an armed timer and drive the manager's
//! scheduling side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionId, SessionSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The gym alarm was armed (initial start, denial repeat, or retry).
    AlarmScheduled {
        session_id: SessionId,
        fires_at: DateTime<Utc>,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    /// The gym alarm went off; the wake-up auto-check window opens.
    AlarmTriggered {
        session_id: SessionId,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    /// Wake-up auto-check timer armed.
    WakeUpCheckArmed {
        session_id: SessionId,
        fires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Wake-up recorded, either by explicit confirmation or timer elapse.
    WakeUpRecorded {
        session_id: SessionId,
        via_timer: bool,
        at: DateTime<Utc>,
    },
    /// User denied being awake; the alarm repeats immediately.
    WakeUpDenied {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
    /// Location-check timer armed.
    LocationCheckArmed {
        session_id: SessionId,
        fires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Location-check timer elapsed; a location sample is needed now.
    LocationCheckDue {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
    /// Gym attendance confirmed. `distance_m` is `None` when no home
    /// location was configured and the check auto-confirmed.
    GymConfirmed {
        session_id: SessionId,
        distance_m: Option<f64>,
        at: DateTime<Utc>,
    },
    /// No location fix could be obtained; the failed check fell through
    /// to the at-home branch.
    LocationUnavailable {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
    /// Failed location check consumed a retry; a new cycle begins.
    RetryScheduled {
        session_id: SessionId,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    /// Retries used up; the session reset to idle.
    RetriesExhausted {
        session_id: SessionId,
        failures: u32,
        at: DateTime<Utc>,
    },
    /// Explicit cancellation; the session reset to idle.
    SessionCancelled {
        session_id: SessionId,
        at: DateTime<Utc>,
    },
    /// Full read-only snapshot for presentation.
    StateSnapshot {
        snapshot: SessionSnapshot,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn session_id(&self) -> SessionId {
        match self {
            Event::AlarmScheduled { session_id, .. }
            | Event::AlarmTriggered { session_id, .. }
            | Event::WakeUpCheckArmed { session_id, .. }
            | Event::WakeUpRecorded { session_id, .. }
            | Event::WakeUpDenied { session_id, .. }
            | Event::LocationCheckArmed { session_id, .. }
            | Event::LocationCheckDue { session_id, .. }
            | Event::GymConfirmed { session_id, .. }
            | Event::LocationUnavailable { session_id, .. }
            | Event::RetryScheduled { session_id, .. }
            | Event::RetriesExhausted { session_id, .. }
            | Event::SessionCancelled { session_id, .. } => *session_id,
            Event::StateSnapshot { snapshot, .. } => snapshot.id,
        }
    }
}
