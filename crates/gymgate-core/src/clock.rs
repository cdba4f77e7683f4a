//! Session timing: "now" plus one-shot, cancellable timer callbacks.
//!
//! The state machine never reads the clock itself; the manager asks a
//! `SessionClock` for the current time and to arm timers. Delivery is
//! a `TimerKey` handed back to the caller, who routes it into
//! `SessionManager::timer_fired`. Staleness is handled by the session's
//! generation token, so a late delivery after `cancel()` is harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::{SessionId, TimerPurpose};

/// Identifies one armed timer: which session, which generation, what for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerKey {
    pub session_id: SessionId,
    pub generation: u64,
    pub purpose: TimerPurpose,
}

/// Opaque reference to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// One-shot timer source. At most one timer is in flight per session;
/// cancelling an already-fired or already-cancelled handle is a no-op.
pub trait SessionClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn schedule(&self, fires_at: DateTime<Utc>, key: TimerKey) -> TimerHandle;
    fn cancel(&self, handle: &TimerHandle);
}

/// Wall clock: each timer is a tokio sleep task that delivers its key
/// over an mpsc channel when it elapses.
pub struct TokioClock {
    tx: mpsc::UnboundedSender<TimerKey>,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_handle: AtomicU64,
}

impl TokioClock {
    /// Returns the clock and the receiving end of the timer channel.
    ///
    /// `schedule` must be called within a tokio runtime context.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TimerKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                tasks: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(0),
            }),
            rx,
        )
    }
}

impl SessionClock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule(&self, fires_at: DateTime<Utc>, key: TimerKey) -> TimerHandle {
        let delay = (fires_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A closed receiver means the host is shutting down.
            let _ = tx.send(key);
        });
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);
        TimerHandle(id)
    }

    fn cancel(&self, handle: &TimerHandle) {
        if let Some(task) = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0)
        {
            task.abort();
        }
    }
}

/// Deterministic clock for tests and for one-shot CLI commands.
///
/// Records armed timers instead of spawning anything; the caller
/// decides when (and whether) a timer fires by reading `armed()` and
/// feeding the key back into the manager.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    armed: Mutex<Vec<(TimerHandle, DateTime<Utc>, TimerKey)>>,
    next_handle: AtomicU64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            armed: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + delta;
    }

    /// Currently armed timers, soonest first.
    pub fn armed(&self) -> Vec<(DateTime<Utc>, TimerKey)> {
        let mut timers: Vec<_> = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, fires_at, key)| (*fires_at, *key))
            .collect();
        timers.sort_by_key(|(fires_at, _)| *fires_at);
        timers
    }
}

impl SessionClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self, fires_at: DateTime<Utc>, key: TimerKey) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, fires_at, key));
        handle
    }

    fn cancel(&self, handle: &TimerHandle) {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(h, _, _)| h != handle);
    }
}
