//! Verification session state machine.
//!
//! A wall-clock state machine in the same discipline as a caller-driven
//! timer engine: it owns no threads and never reads the clock itself.
//! Every operation takes `now` and returns the events it produced; the
//! manager performs the scheduling and notification side effects.
//!
//! ## Stages
//!
//! ```text
//! Idle -> AlarmTriggered -> WakeupCheck -> LocationCheck -> GymConfirmed
//!              ^                                  |
//!              +------- retry (at home) ----------+--> Idle (exhausted)
//! ```
//!
//! At most one timer is armed at any time. Arming replaces the previous
//! timer and bumps the generation token, so a callback from a
//! superseded timer is recognizably stale and dropped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SessionError;
use crate::events::Event;
use crate::geo::{self, Coordinates};
use crate::retry::{self, RetryDecision};
use crate::settings::GymSettings;

use super::SessionId;

/// Stage of the verification workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    AlarmTriggered,
    WakeupCheck,
    LocationCheck,
    GymConfirmed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::AlarmTriggered => "alarm_triggered",
            Stage::WakeupCheck => "wakeup_check",
            Stage::LocationCheck => "location_check",
            Stage::GymConfirmed => "gym_confirmed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an armed timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPurpose {
    /// The gym alarm itself, due at the configured gym time.
    GymAlert,
    /// Auto-check window after the alarm; elapse counts as woken up.
    WakeUpCheck,
    /// Delay between wake-up and the location check.
    LocationCheck,
}

/// The single timer a session may have armed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmedTimer {
    pub purpose: TimerPurpose,
    pub fires_at: DateTime<Utc>,
    /// Generation token; a callback carrying an older token is stale.
    pub generation: u64,
}

/// Result of a location check against the geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttendanceOutcome {
    /// Outside the home geofence; gym attendance confirmed.
    Confirmed { distance_m: f64 },
    /// Still at home; a retry cycle was scheduled.
    Retrying { retry_count: u32 },
    /// Still at home and retries are used up; session reset to idle.
    Exhausted,
}

/// What to do after a failed location read.
#[derive(Debug)]
pub enum LocationReadDisposition {
    /// First failure: hold in `LocationCheck`, re-read immediately.
    ReadAgain,
    /// Second failure: treated as a failed location check.
    TreatedAsHome {
        outcome: AttendanceOutcome,
        events: Vec<Event>,
    },
}

/// Read-only view of a session for presentation and persistence checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub stage: Stage,
    pub is_active: bool,
    pub gym_attendance_confirmed: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_wake_up_check_at: Option<DateTime<Utc>>,
    pub last_location_check_at: Option<DateTime<Utc>>,
    pub armed_timer: Option<ArmedTimer>,
}

/// The gym-attendance verification state machine.
///
/// Settings are copied at `start()`; editing the stored settings while
/// a cycle is in flight does not alter that cycle's delays or retry
/// budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSession {
    id: SessionId,
    settings: GymSettings,
    stage: Stage,
    is_active: bool,
    last_wake_up_check_at: Option<DateTime<Utc>>,
    last_location_check_at: Option<DateTime<Utc>>,
    gym_attendance_confirmed: bool,
    retry_count: u32,
    generation: u64,
    armed_timer: Option<ArmedTimer>,
    /// Bounded re-read counter for failed location fixes; independent
    /// of the cycle retry counter.
    #[serde(default)]
    location_read_attempts: u32,
    /// Diagnostics only.
    #[serde(default)]
    stale_timer_drops: u64,
}

impl VerificationSession {
    pub fn new(id: SessionId, settings: GymSettings) -> Self {
        Self {
            id,
            settings,
            stage: Stage::Idle,
            is_active: false,
            last_wake_up_check_at: None,
            last_location_check_at: None,
            gym_attendance_confirmed: false,
            retry_count: 0,
            generation: 0,
            armed_timer: None,
            location_read_attempts: 0,
            stale_timer_drops: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn settings(&self) -> &GymSettings {
        &self.settings
    }

    pub fn armed_timer(&self) -> Option<ArmedTimer> {
        self.armed_timer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stale_timer_drops(&self) -> u64 {
        self.stale_timer_drops
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            stage: self.stage,
            is_active: self.is_active,
            gym_attendance_confirmed: self.gym_attendance_confirmed,
            retry_count: self.retry_count,
            max_retries: self.settings.max_retries,
            last_wake_up_check_at: self.last_wake_up_check_at,
            last_location_check_at: self.last_location_check_at,
            armed_timer: self.armed_timer,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a cycle: arm the gym alarm at the next occurrence of the
    /// configured gym time. Valid from `Idle` and from `GymConfirmed`
    /// (a new day's cycle).
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>, SessionError> {
        match self.stage {
            Stage::Idle | Stage::GymConfirmed => {}
            stage => return Err(SessionError::IgnoredWrongStage { stage }),
        }
        self.reset_fields();
        self.is_active = true;
        self.stage = Stage::AlarmTriggered;
        let fires_at = self.settings.gym_time.next_occurrence(now);
        self.arm(TimerPurpose::GymAlert, fires_at);
        Ok(vec![Event::AlarmScheduled {
            session_id: self.id,
            fires_at,
            retry_count: 0,
            at: now,
        }])
    }

    /// Replace the settings used by the next cycle. Only valid between
    /// cycles; an in-flight cycle keeps the snapshot it copied at
    /// `start()`.
    pub fn update_settings(&mut self, settings: GymSettings) -> Result<(), SessionError> {
        match self.stage {
            Stage::Idle | Stage::GymConfirmed => {
                self.settings = settings;
                Ok(())
            }
            stage => Err(SessionError::IgnoredWrongStage { stage }),
        }
    }

    /// Explicit wake-up confirmation from the user.
    pub fn confirm_wake_up(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>, SessionError> {
        if self.stage != Stage::AlarmTriggered {
            return Err(SessionError::IgnoredWrongStage { stage: self.stage });
        }
        Ok(self.enter_wakeup_check(now, false))
    }

    /// User denied being awake: the alarm repeats immediately, with no
    /// stage change.
    pub fn deny_wake_up(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>, SessionError> {
        if self.stage != Stage::AlarmTriggered {
            return Err(SessionError::IgnoredWrongStage { stage: self.stage });
        }
        self.arm(TimerPurpose::GymAlert, now);
        Ok(vec![
            Event::WakeUpDenied {
                session_id: self.id,
                at: now,
            },
            Event::AlarmScheduled {
                session_id: self.id,
                fires_at: now,
                retry_count: self.retry_count,
                at: now,
            },
        ])
    }

    /// A timer callback arrived. Stale callbacks (older generation, or
    /// no timer armed) are dropped without any transition.
    pub fn timer_fired(&mut self, generation: u64, now: DateTime<Utc>) -> Vec<Event> {
        let armed = match self.armed_timer {
            Some(armed) if armed.generation == generation => armed,
            _ => {
                self.stale_timer_drops += 1;
                tracing::debug!(
                    session = %self.id,
                    generation,
                    current = self.generation,
                    "dropping stale timer callback"
                );
                return Vec::new();
            }
        };
        self.armed_timer = None;

        match (armed.purpose, self.stage) {
            (TimerPurpose::GymAlert, Stage::AlarmTriggered) => {
                // Alarm went off; open the wake-up auto-check window.
                let fires_at = now + Duration::minutes(self.settings.wake_up_delay_min.into());
                self.arm(TimerPurpose::WakeUpCheck, fires_at);
                vec![
                    Event::AlarmTriggered {
                        session_id: self.id,
                        retry_count: self.retry_count,
                        at: now,
                    },
                    Event::WakeUpCheckArmed {
                        session_id: self.id,
                        fires_at,
                        at: now,
                    },
                ]
            }
            // Timer elapse and explicit confirmation are equivalent
            // paths forward; a missed tap must not stall the pipeline.
            (TimerPurpose::WakeUpCheck, Stage::AlarmTriggered) => self.enter_wakeup_check(now, true),
            (TimerPurpose::LocationCheck, Stage::WakeupCheck) => {
                self.last_location_check_at = Some(now);
                if self.settings.home_location.is_none() {
                    // Cannot verify without a home location; best effort
                    // is to trust the user.
                    self.complete_confirmed(now, None)
                } else {
                    self.stage = Stage::LocationCheck;
                    vec![Event::LocationCheckDue {
                        session_id: self.id,
                        at: now,
                    }]
                }
            }
            (purpose, stage) => {
                // Outside the transition table: a programming defect.
                debug_assert!(false, "timer {purpose:?} fired in stage {stage}");
                tracing::warn!(
                    session = %self.id,
                    ?purpose,
                    %stage,
                    "timer fired outside the transition table, resetting to idle"
                );
                self.reset_fields();
                Vec::new()
            }
        }
    }

    /// Evaluate a location sample against the home geofence.
    ///
    /// Fails with `ConfigurationMissing` when no home location is set,
    /// regardless of stage, and performs no transition.
    pub fn confirm_gym_attendance(
        &mut self,
        sample: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<(AttendanceOutcome, Vec<Event>), SessionError> {
        let home = self
            .settings
            .home_location
            .ok_or(SessionError::ConfigurationMissing)?;
        match self.stage {
            // A sample arriving before the location timer elapsed still
            // counts; forward progress is favored.
            Stage::WakeupCheck | Stage::LocationCheck => {}
            stage => return Err(SessionError::IgnoredWrongStage { stage }),
        }
        self.stage = Stage::LocationCheck;
        self.last_location_check_at = Some(now);
        self.location_read_attempts = 0;

        let distance_m = geo::haversine_distance_m(sample, home);
        if distance_m > self.settings.geofence_radius_m {
            let events = self.complete_confirmed(now, Some(distance_m));
            Ok((AttendanceOutcome::Confirmed { distance_m }, events))
        } else {
            Ok(self.location_check_failed(now))
        }
    }

    /// Record a failed location read during the location check.
    ///
    /// The first failure holds the session in `LocationCheck` and asks
    /// the caller to re-read once; the second is treated as a failed
    /// location check and consumes a cycle retry. Like a successful
    /// sample, a failed read is accepted from `WakeupCheck` too: the
    /// pending location timer is dropped and the check starts early.
    pub fn location_read_failed(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<LocationReadDisposition, SessionError> {
        match self.stage {
            Stage::WakeupCheck => {
                self.disarm();
                self.stage = Stage::LocationCheck;
            }
            Stage::LocationCheck => {}
            stage => return Err(SessionError::IgnoredWrongStage { stage }),
        }
        self.last_location_check_at = Some(now);
        if self.location_read_attempts == 0 {
            self.location_read_attempts = 1;
            return Ok(LocationReadDisposition::ReadAgain);
        }
        self.location_read_attempts = 0;
        let (outcome, events) = self.location_check_failed(now);
        Ok(LocationReadDisposition::TreatedAsHome { outcome, events })
    }

    /// Cancel always wins: any armed timer is dropped and the session
    /// resets to idle, settings preserved. Idempotent.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if self.stage == Stage::Idle && !self.is_active {
            return Vec::new();
        }
        self.reset_fields();
        vec![Event::SessionCancelled {
            session_id: self.id,
            at: now,
        }]
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn enter_wakeup_check(&mut self, now: DateTime<Utc>, via_timer: bool) -> Vec<Event> {
        self.stage = Stage::WakeupCheck;
        self.last_wake_up_check_at = Some(now);
        let fires_at = now + Duration::minutes(self.settings.location_check_delay_min.into());
        self.arm(TimerPurpose::LocationCheck, fires_at);
        vec![
            Event::WakeUpRecorded {
                session_id: self.id,
                via_timer,
                at: now,
            },
            Event::LocationCheckArmed {
                session_id: self.id,
                fires_at,
                at: now,
            },
        ]
    }

    fn location_check_failed(&mut self, now: DateTime<Utc>) -> (AttendanceOutcome, Vec<Event>) {
        match retry::decide(self.retry_count, self.settings.max_retries) {
            RetryDecision::Retry(next) => {
                self.retry_count = next;
                self.stage = Stage::AlarmTriggered;
                self.arm(TimerPurpose::GymAlert, now);
                (
                    AttendanceOutcome::Retrying { retry_count: next },
                    vec![
                        Event::RetryScheduled {
                            session_id: self.id,
                            retry_count: next,
                            at: now,
                        },
                        Event::AlarmScheduled {
                            session_id: self.id,
                            fires_at: now,
                            retry_count: next,
                            at: now,
                        },
                    ],
                )
            }
            RetryDecision::Exhausted => {
                let failures = self.retry_count + 1;
                self.reset_fields();
                (
                    AttendanceOutcome::Exhausted,
                    vec![Event::RetriesExhausted {
                        session_id: self.id,
                        failures,
                        at: now,
                    }],
                )
            }
        }
    }

    fn complete_confirmed(&mut self, now: DateTime<Utc>, distance_m: Option<f64>) -> Vec<Event> {
        self.stage = Stage::GymConfirmed;
        self.gym_attendance_confirmed = true;
        self.is_active = false;
        self.location_read_attempts = 0;
        self.disarm();
        vec![Event::GymConfirmed {
            session_id: self.id,
            distance_m,
            at: now,
        }]
    }

    /// Back to idle with all cycle state cleared; settings preserved.
    fn reset_fields(&mut self) {
        self.stage = Stage::Idle;
        self.is_active = false;
        self.gym_attendance_confirmed = false;
        self.retry_count = 0;
        self.last_wake_up_check_at = None;
        self.last_location_check_at = None;
        self.location_read_attempts = 0;
        self.disarm();
    }

    fn arm(&mut self, purpose: TimerPurpose, fires_at: DateTime<Utc>) {
        self.generation += 1;
        self.armed_timer = Some(ArmedTimer {
            purpose,
            fires_at,
            generation: self.generation,
        });
    }

    fn disarm(&mut self) {
        if self.armed_timer.take().is_some() {
            // Invalidate callbacks already in flight.
            self.generation += 1;
        }
    }
}
