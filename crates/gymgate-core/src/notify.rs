//! Notification gateway.
//!
//! Alerts are fire-and-forget: the session never blocks on delivery and
//! a delivery failure is the gateway's to log, not a session error.
//! The payload is a closed set of purposes, each carrying only the
//! fields it needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use crate::session::SessionId;
use crate::settings::GymTime;

/// What the user is being alerted about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    /// The gym alarm itself, with yes/no wake-up actions attached.
    GymAlert { gym_time: GymTime },
    /// Wake-up check prompt.
    WakeUpCheck,
    /// Location check reminder.
    LocationCheck,
}

impl NotificationPayload {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationPayload::GymAlert { .. } => "🏋️ Gym Time!",
            NotificationPayload::WakeUpCheck => "⏰ Wake Up Check",
            NotificationPayload::LocationCheck => "📍 Location Check",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            NotificationPayload::GymAlert { .. } => "Time to hit the gym! Are you ready?",
            NotificationPayload::WakeUpCheck => "Are you awake and ready for gym?",
            NotificationPayload::LocationCheck => {
                "Please share your location to confirm gym attendance."
            }
        }
    }
}

/// Platform alerting seam.
pub trait NotificationGateway: Send + Sync {
    /// Request an alert at `at`. Best effort; must not block.
    fn alert(&self, session_id: SessionId, payload: &NotificationPayload, at: DateTime<Utc>);
    /// Withdraw any pending alerts for the session.
    fn cancel(&self, session_id: SessionId);
}

/// Prints alerts to stdout; the CLI's delivery mechanism.
pub struct ConsoleNotifier;

impl NotificationGateway for ConsoleNotifier {
    fn alert(&self, _session_id: SessionId, payload: &NotificationPayload, at: DateTime<Utc>) {
        println!(
            "[{}] {} — {}",
            at.format("%H:%M"),
            payload.title(),
            payload.message()
        );
    }

    fn cancel(&self, _session_id: SessionId) {}
}

/// Records alerts for assertions in tests.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(SessionId, NotificationPayload, DateTime<Utc>)>>,
    cancels: Mutex<Vec<SessionId>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<(SessionId, NotificationPayload, DateTime<Utc>)> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cancels(&self) -> Vec<SessionId> {
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationGateway for RecordingNotifier {
    fn alert(&self, session_id: SessionId, payload: &NotificationPayload, at: DateTime<Utc>) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session_id, payload.clone(), at));
    }

    fn cancel(&self, session_id: SessionId) {
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_is_fixed_per_purpose() {
        let gym = NotificationPayload::GymAlert {
            gym_time: "06:00".parse().unwrap(),
        };
        assert_eq!(gym.title(), "🏋️ Gym Time!");
        assert_eq!(
            NotificationPayload::WakeUpCheck.message(),
            "Are you awake and ready for gym?"
        );
    }

    #[test]
    fn payload_serializes_with_purpose_tag() {
        let json = serde_json::to_value(&NotificationPayload::LocationCheck).unwrap();
        assert_eq!(json["type"], "location_check");
    }
}
