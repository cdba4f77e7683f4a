//! Session manager: owns the live sessions and their side effects.
//!
//! The state machine decides; the manager executes. After every
//! operation it reconciles the session's armed timer against the clock
//! (cancel the superseded one, schedule the new one), requests the
//! matching notification, and persists a snapshot. All operations take
//! the session map lock for their full duration, so transitions are
//! serialized per manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::{SessionClock, TimerHandle, TimerKey};
use crate::error::{CoreError, SessionError};
use crate::events::Event;
use crate::geo::Coordinates;
use crate::location::LocationProvider;
use crate::notify::{NotificationGateway, NotificationPayload};
use crate::settings::GymSettings;
use crate::storage::SessionDb;

use super::machine::{
    AttendanceOutcome, LocationReadDisposition, SessionSnapshot, TimerPurpose, VerificationSession,
};
use super::SessionId;

pub struct SessionManager {
    clock: Arc<dyn SessionClock>,
    notifier: Arc<dyn NotificationGateway>,
    location: Arc<dyn LocationProvider>,
    db: Mutex<SessionDb>,
    sessions: Mutex<HashMap<SessionId, VerificationSession>>,
    /// Scheduled clock timer per session, tagged with its generation.
    handles: Mutex<HashMap<SessionId, (u64, TimerHandle)>>,
}

impl SessionManager {
    pub fn new(
        clock: Arc<dyn SessionClock>,
        notifier: Arc<dyn NotificationGateway>,
        location: Arc<dyn LocationProvider>,
        db: SessionDb,
    ) -> Self {
        Self {
            clock,
            notifier,
            location,
            db: Mutex::new(db),
            sessions: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new session with the given settings and start its cycle.
    pub fn start(&self, settings: GymSettings) -> Result<(SessionId, Vec<Event>), CoreError> {
        settings.validate()?;
        let mut session = VerificationSession::new(SessionId::new(), settings);
        let id = session.id();
        let events = session.start(self.clock.now()).map_err(CoreError::from)?;
        self.commit(&session, true)?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session);
        tracing::info!(session = %id, "verification session started");
        Ok((id, events))
    }

    /// Start a fresh cycle on an existing session (idle or confirmed).
    ///
    /// The new cycle uses `settings` as its snapshot, so edits made
    /// since the previous cycle take effect here.
    pub fn restart(&self, id: SessionId, settings: GymSettings) -> Result<Vec<Event>, CoreError> {
        settings.validate()?;
        let now = self.clock.now();
        self.mutate(id, true, |session| {
            session.update_settings(settings)?;
            session.start(now)
        })
    }

    pub fn confirm_wake_up(&self, id: SessionId) -> Result<Vec<Event>, CoreError> {
        let now = self.clock.now();
        self.mutate(id, true, |session| session.confirm_wake_up(now))
    }

    pub fn deny_wake_up(&self, id: SessionId) -> Result<Vec<Event>, CoreError> {
        let now = self.clock.now();
        self.mutate(id, true, |session| session.deny_wake_up(now))
    }

    /// Route an elapsed clock timer into its session. Stale keys are
    /// dropped by the session and produce no events.
    pub fn timer_fired(&self, key: TimerKey) -> Result<Vec<Event>, CoreError> {
        let now = self.clock.now();
        self.mutate(key.session_id, true, |session| {
            Ok(session.timer_fired(key.generation, now))
        })
    }

    /// Evaluate an explicit location sample against the home geofence.
    pub fn confirm_gym_attendance(
        &self,
        id: SessionId,
        sample: Coordinates,
    ) -> Result<(AttendanceOutcome, Vec<Event>), CoreError> {
        let now = self.clock.now();
        self.mutate(id, true, |session| {
            session.confirm_gym_attendance(sample, now)
        })
    }

    /// Read the location provider and evaluate the sample.
    ///
    /// A failed read gets one immediate re-read; a second failure is
    /// treated as an at-home result, with a `LocationUnavailable` event
    /// recording why.
    pub fn verify_location(
        &self,
        id: SessionId,
    ) -> Result<(AttendanceOutcome, Vec<Event>), CoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        let now = self.clock.now();

        let result = loop {
            match self.location.current_location() {
                Ok(sample) => break session.confirm_gym_attendance(sample, now)?,
                Err(err) => match session.location_read_failed(now)? {
                    LocationReadDisposition::ReadAgain => {
                        tracing::debug!(session = %id, error = %err, "location read failed, retrying once");
                    }
                    LocationReadDisposition::TreatedAsHome { outcome, mut events } => {
                        tracing::warn!(session = %id, error = %err, "location unavailable, treating as at home");
                        events.insert(0, Event::LocationUnavailable { session_id: id, at: now });
                        break (outcome, events);
                    }
                },
            }
        };
        self.commit(session, true)?;
        Ok(result)
    }

    /// Cancel the session's cycle. Idempotent; the session itself stays
    /// registered with its settings.
    pub fn cancel(&self, id: SessionId) -> Result<Vec<Event>, CoreError> {
        let now = self.clock.now();
        self.mutate(id, true, |session| {
            Ok::<_, SessionError>(session.cancel(now))
        })
    }

    /// Drop a session entirely: timer, notifications, persisted record.
    pub fn remove(&self, id: SessionId) -> Result<(), CoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.remove(&id).is_none() {
            return Err(SessionError::UnknownSession(id).into());
        }
        if let Some((_, handle)) = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
        {
            self.clock.cancel(&handle);
        }
        self.notifier.cancel(id);
        self.db
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .delete_session(id)?;
        Ok(())
    }

    pub fn current_state(&self, id: SessionId) -> Result<SessionSnapshot, CoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
        Ok(session.snapshot())
    }

    /// Snapshots of every registered session.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(VerificationSession::snapshot)
            .collect()
    }

    /// Ids of sessions with a cycle in flight.
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.is_active())
            .map(VerificationSession::id)
            .collect()
    }

    /// Load persisted sessions and pick their cycles back up.
    ///
    /// A timer that came due while the process was down fires once, at
    /// its persisted generation; still-future timers are re-armed
    /// silently so a restart does not repeat notifications.
    pub fn resume(&self) -> Result<Vec<Event>, CoreError> {
        let stored = self
            .db
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .load_all_sessions()?;
        let now = self.clock.now();
        let mut all_events = Vec::new();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for mut session in stored {
            let past_due = session
                .armed_timer()
                .is_some_and(|t| t.fires_at <= now);
            if past_due {
                if let Some(t) = session.armed_timer() {
                    tracing::info!(
                        session = %session.id(),
                        purpose = ?t.purpose,
                        "replaying timer that came due while offline"
                    );
                    all_events.extend(session.timer_fired(t.generation, now));
                }
            }
            self.commit(&session, past_due)?;
            sessions.insert(session.id(), session);
        }
        Ok(all_events)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn mutate<T>(
        &self,
        id: SessionId,
        alert: bool,
        op: impl FnOnce(&mut VerificationSession) -> Result<T, SessionError>,
    ) -> Result<T, CoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        let out = op(session)?;
        self.commit(session, alert)?;
        Ok(out)
    }

    /// Sync clock and notifier with the session's armed timer, then
    /// persist the session.
    fn commit(&self, session: &VerificationSession, alert: bool) -> Result<(), CoreError> {
        self.reconcile_timer(session, alert);
        self.db
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .save_session(session)?;
        Ok(())
    }

    fn reconcile_timer(&self, session: &VerificationSession, alert: bool) {
        let id = session.id();
        let armed = session.armed_timer();
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((generation, handle)) = handles.remove(&id) {
            if armed.map(|t| t.generation) == Some(generation) {
                // Already scheduled for this generation.
                handles.insert(id, (generation, handle));
                return;
            }
            self.clock.cancel(&handle);
            if armed.is_none() {
                self.notifier.cancel(id);
            }
        }

        if let Some(timer) = armed {
            let key = TimerKey {
                session_id: id,
                generation: timer.generation,
                purpose: timer.purpose,
            };
            let handle = self.clock.schedule(timer.fires_at, key);
            handles.insert(id, (timer.generation, handle));
            if alert {
                self.notifier
                    .alert(id, &payload_for(timer.purpose, session), timer.fires_at);
            }
        }
    }
}

fn payload_for(purpose: TimerPurpose, session: &VerificationSession) -> NotificationPayload {
    match purpose {
        TimerPurpose::GymAlert => NotificationPayload::GymAlert {
            gym_time: session.settings().gym_time,
        },
        TimerPurpose::WakeUpCheck => NotificationPayload::WakeUpCheck,
        TimerPurpose::LocationCheck => NotificationPayload::LocationCheck,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::location::{LocationError, ScriptedLocation};
    use crate::notify::RecordingNotifier;
    use crate::session::Stage;
    use chrono::{TimeZone, Utc};

    fn harness(
        location: Arc<dyn LocationProvider>,
    ) -> (Arc<ManualClock>, Arc<RecordingNotifier>, SessionManager) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 5, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = SessionManager::new(
            clock.clone(),
            notifier.clone(),
            location,
            SessionDb::open_memory().unwrap(),
        );
        (clock, notifier, manager)
    }

    fn settings_with_home() -> GymSettings {
        GymSettings {
            home_location: Some(Coordinates::new(0.0, 0.0)),
            ..GymSettings::default()
        }
    }

    /// Fire the soonest armed clock timer, advancing `now` to it.
    fn fire_next(clock: &ManualClock, manager: &SessionManager) -> Vec<Event> {
        let (fires_at, key) = clock.armed()[0];
        if fires_at > clock.now() {
            clock.set_now(fires_at);
        }
        manager.timer_fired(key).unwrap()
    }

    #[test]
    fn full_cycle_away_sample_confirms_and_persists() {
        let away = Arc::new(ScriptedLocation::new([Ok(Coordinates::new(0.0, 0.001))]));
        let (clock, notifier, manager) = harness(away);

        let (id, events) = manager.start(settings_with_home()).unwrap();
        assert!(matches!(events[0], Event::AlarmScheduled { .. }));
        // Clock holds the gym alert; the notifier was asked to alert at
        // the same time.
        assert_eq!(clock.armed().len(), 1);
        assert!(matches!(
            notifier.alerts()[0].1,
            NotificationPayload::GymAlert { .. }
        ));

        fire_next(&clock, &manager); // gym alert -> wake-up window
        fire_next(&clock, &manager); // wake-up window -> location check armed
        let events = fire_next(&clock, &manager); // location check due
        assert!(matches!(events[0], Event::LocationCheckDue { .. }));
        assert_eq!(manager.current_state(id).unwrap().stage, Stage::LocationCheck);

        let (outcome, _) = manager.verify_location(id).unwrap();
        assert!(matches!(outcome, AttendanceOutcome::Confirmed { .. }));

        let snapshot = manager.current_state(id).unwrap();
        assert_eq!(snapshot.stage, Stage::GymConfirmed);
        assert!(snapshot.gym_attendance_confirmed);
        assert!(clock.armed().is_empty());
        // Notification for the completed session was withdrawn.
        assert_eq!(notifier.cancels(), vec![id]);
        // Each purpose alerted exactly once.
        assert_eq!(notifier.alerts().len(), 3);
    }

    #[test]
    fn deny_wake_up_rearms_alarm_now() {
        let (clock, notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        let (id, _) = manager.start(settings_with_home()).unwrap();
        let before = clock.armed()[0].1.generation;

        manager.deny_wake_up(id).unwrap();
        let armed = clock.armed();
        assert_eq!(armed.len(), 1);
        assert!(armed[0].1.generation > before);
        assert_eq!(armed[0].0, clock.now());
        // A fresh gym alert notification was requested.
        assert!(matches!(
            notifier.alerts().last().unwrap().1,
            NotificationPayload::GymAlert { .. }
        ));
    }

    #[test]
    fn unavailable_location_falls_through_to_retry() {
        let unavailable = Arc::new(ScriptedLocation::new([
            Err(LocationError::NoFix),
            Err(LocationError::PermissionDenied),
        ]));
        let (clock, _notifier, manager) = harness(unavailable);
        let (id, _) = manager.start(settings_with_home()).unwrap();
        fire_next(&clock, &manager);
        fire_next(&clock, &manager);
        fire_next(&clock, &manager);

        let (outcome, events) = manager.verify_location(id).unwrap();
        assert_eq!(outcome, AttendanceOutcome::Retrying { retry_count: 1 });
        assert!(matches!(events[0], Event::LocationUnavailable { .. }));
        assert!(matches!(events[1], Event::RetryScheduled { .. }));
        assert_eq!(
            manager.current_state(id).unwrap().stage,
            Stage::AlarmTriggered
        );
    }

    #[test]
    fn early_verification_handles_read_failure_like_a_sample() {
        // Verification requested before the location timer elapsed:
        // a failed first read starts the check early and the re-read
        // resolves it, same as a sample arriving early would.
        let provider = Arc::new(ScriptedLocation::new([
            Err(LocationError::NoFix),
            Ok(Coordinates::new(0.0, 0.001)),
        ]));
        let (clock, _notifier, manager) = harness(provider);
        let (id, _) = manager.start(settings_with_home()).unwrap();
        fire_next(&clock, &manager); // gym alert
        manager.confirm_wake_up(id).unwrap();
        assert_eq!(manager.current_state(id).unwrap().stage, Stage::WakeupCheck);

        let (outcome, events) = manager.verify_location(id).unwrap();
        assert!(matches!(outcome, AttendanceOutcome::Confirmed { .. }));
        assert!(matches!(events[0], Event::GymConfirmed { .. }));
        assert!(clock.armed().is_empty());
    }

    #[test]
    fn cancel_clears_clock_and_notifications() {
        let (clock, notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        let (id, _) = manager.start(settings_with_home()).unwrap();
        assert_eq!(clock.armed().len(), 1);

        let events = manager.cancel(id).unwrap();
        assert!(matches!(events[0], Event::SessionCancelled { .. }));
        assert!(clock.armed().is_empty());
        assert_eq!(notifier.cancels(), vec![id]);

        // Idempotent.
        assert!(manager.cancel(id).unwrap().is_empty());
    }

    #[test]
    fn operations_on_unknown_sessions_fail() {
        let (_clock, _notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        let err = manager.confirm_wake_up(SessionId::new()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Session(SessionError::UnknownSession(_))
        ));
    }

    #[test]
    fn every_transition_is_persisted() {
        let (clock, _notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        let (id, _) = manager.start(settings_with_home()).unwrap();
        fire_next(&clock, &manager);
        manager.confirm_wake_up(id).unwrap();

        let persisted = manager
            .db
            .lock()
            .unwrap()
            .load_session(id)
            .unwrap()
            .unwrap();
        assert_eq!(persisted.snapshot(), manager.current_state(id).unwrap());
    }

    #[test]
    fn active_sessions_tracks_cycle_state() {
        let (_clock, _notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        assert!(manager.active_sessions().is_empty());
        let (id, _) = manager.start(settings_with_home()).unwrap();
        assert_eq!(manager.active_sessions(), vec![id]);
        manager.cancel(id).unwrap();
        assert!(manager.active_sessions().is_empty());
        assert_eq!(manager.snapshots().len(), 1);
    }

    #[test]
    fn restart_after_confirmation_begins_a_new_cycle() {
        let away = Arc::new(ScriptedLocation::new([Ok(Coordinates::new(0.0, 0.001))]));
        let (clock, _notifier, manager) = harness(away);
        let (id, _) = manager.start(settings_with_home()).unwrap();
        fire_next(&clock, &manager);
        fire_next(&clock, &manager);
        fire_next(&clock, &manager);
        manager.verify_location(id).unwrap();
        assert!(clock.armed().is_empty());

        let events = manager.restart(id, settings_with_home()).unwrap();
        assert!(matches!(events[0], Event::AlarmScheduled { .. }));
        let snapshot = manager.current_state(id).unwrap();
        assert_eq!(snapshot.stage, Stage::AlarmTriggered);
        assert_eq!(snapshot.retry_count, 0);
        assert_eq!(clock.armed().len(), 1);
    }

    #[test]
    fn restart_picks_up_edited_settings() {
        let (clock, _notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        let (id, _) = manager.start(settings_with_home()).unwrap();
        // Default gym time 06:00, started at 05:00.
        assert_eq!(
            clock.armed()[0].0,
            Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
        );
        manager.cancel(id).unwrap();

        let edited = GymSettings {
            gym_time: "07:30".parse().unwrap(),
            ..settings_with_home()
        };
        manager.restart(id, edited).unwrap();
        assert_eq!(
            clock.armed()[0].0,
            Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0).unwrap()
        );
    }

    #[test]
    fn remove_deletes_the_persisted_record() {
        let (_clock, _notifier, manager) =
            harness(Arc::new(ScriptedLocation::new([])));
        let (id, _) = manager.start(settings_with_home()).unwrap();
        manager.remove(id).unwrap();
        assert!(manager.current_state(id).is_err());
        assert!(manager.db.lock().unwrap().load_session(id).unwrap().is_none());
    }
}
