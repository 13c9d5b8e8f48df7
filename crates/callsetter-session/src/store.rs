//! The single mutable call state record and its metrics.

use callsetter_types::{CallMetrics, CallState};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    state: CallState,
    metrics: CallMetrics,
    /// Monotonic start of the current call. Duration is derived from this,
    /// never counted, so a stalled timer cannot drift.
    started_at: Option<Instant>,
    /// Generation of the most recent start attempt.
    attempt: u64,
    /// Attempt cancelled locally whose remote call may still come up.
    cancelled: Option<u64>,
}

/// Outcome of a `call-start` arriving at the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartTransition {
    Started,
    /// A call is already active; the original start time is kept.
    Duplicate,
    /// The attempt this call belongs to was cancelled before it came up.
    Cancelled,
}

/// Holds [`CallState`] and [`CallMetrics`].
///
/// Every mutation keeps the state invariants: `in_call` and
/// `is_connecting` are exclusive, `call_start_time` is set iff `in_call`,
/// and `call_duration` is zero outside a call. Only the session manager
/// writes; anyone may read a snapshot.
#[derive(Debug, Default)]
pub struct CallStateStore {
    inner: Mutex<Inner>,
}

impl CallStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CallState {
        self.lock().state.clone()
    }

    pub fn metrics(&self) -> CallMetrics {
        self.lock().metrics
    }

    /// Idle → Connecting. Returns the attempt generation, or `None` if a
    /// call is already connecting or active.
    pub(crate) fn begin_connecting(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.state.in_call || inner.state.is_connecting {
            return None;
        }
        inner.attempt += 1;
        inner.cancelled = None;
        inner.state.is_connecting = true;
        Some(inner.attempt)
    }

    /// Connecting → Idle. With `Some(attempt)`, only aborts if that attempt
    /// is still the one connecting. Returns whether the state changed.
    pub(crate) fn abort_connecting(&self, attempt: Option<u64>) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_connecting {
            return false;
        }
        if attempt.is_some_and(|a| a != inner.attempt) {
            return false;
        }
        inner.state.is_connecting = false;
        true
    }

    /// Connecting → Idle on the caller's behalf. Unlike
    /// [`abort_connecting`](Self::abort_connecting) the attempt is remembered,
    /// so a `call-start` that still arrives for it is refused.
    pub(crate) fn cancel_connecting(&self, attempt: Option<u64>) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_connecting || attempt.is_some_and(|a| a != inner.attempt) {
            return false;
        }
        inner.state.is_connecting = false;
        inner.cancelled = Some(inner.attempt);
        true
    }

    /// Whether `attempt` was cancelled or superseded by a newer one.
    pub(crate) fn is_abandoned(&self, attempt: u64) -> bool {
        let inner = self.lock();
        inner.attempt != attempt || inner.cancelled == Some(attempt)
    }

    /// Connecting (or Idle) → InCall.
    pub(crate) fn mark_started(&self) -> StartTransition {
        let mut inner = self.lock();
        if inner.state.in_call {
            return StartTransition::Duplicate;
        }
        if !inner.state.is_connecting && inner.cancelled.is_some() {
            return StartTransition::Cancelled;
        }
        inner.state = CallState {
            in_call: true,
            is_connecting: false,
            call_duration: 0,
            call_start_time: Some(Utc::now()),
        };
        inner.started_at = Some(Instant::now());
        StartTransition::Started
    }

    /// Any → Idle, clearing metrics. Returns whether a call or connection
    /// attempt was actually in progress.
    pub(crate) fn mark_ended(&self) -> bool {
        let mut inner = self.lock();
        let was_active = inner.state.in_call || inner.state.is_connecting;
        inner.state = CallState::default();
        inner.metrics = CallMetrics::default();
        inner.started_at = None;
        inner.cancelled = None;
        was_active
    }

    pub(crate) fn set_user_speaking(&self, speaking: bool) {
        self.lock().metrics.is_user_speaking = Some(speaking);
    }

    /// Records an audio level, clamped to `0.0..=1.0`. Non-finite levels
    /// are ignored.
    pub(crate) fn set_audio_level(&self, level: f32) -> Option<f32> {
        if !level.is_finite() {
            return None;
        }
        let level = level.clamp(0.0, 1.0);
        self.lock().metrics.audio_level = Some(level);
        Some(level)
    }

    /// Recomputes `call_duration` from the start instant.
    ///
    /// Returns the new duration, or `None` outside a call.
    pub(crate) fn refresh_duration(&self) -> Option<u64> {
        let mut inner = self.lock();
        let started_at = inner.started_at.filter(|_| inner.state.in_call)?;
        let seconds = started_at.elapsed().as_secs();
        inner.state.call_duration = seconds;
        Some(seconds)
    }
}
