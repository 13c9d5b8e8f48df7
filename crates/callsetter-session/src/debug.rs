//! Opt-in diagnostics for a running session.

use crate::bus::Listener;
use crate::event::{EventKind, SessionEvent};
use crate::manager::CallSessionManager;
use callsetter_types::{CallMetrics, CallState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Listeners installed by [`attach_debug_tap`].
#[derive(Clone)]
pub struct DebugTap {
    listeners: Vec<(EventKind, Listener)>,
}

impl std::fmt::Debug for DebugTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugTap")
            .field("kinds", &self.listeners.len())
            .finish()
    }
}

impl DebugTap {
    /// Removes the tap's listeners from `manager`.
    pub fn detach(self, manager: &CallSessionManager) {
        for (kind, listener) in &self.listeners {
            manager.off(*kind, listener);
        }
    }
}

/// Logs every session event at `debug` level.
///
/// Call only when debugging is enabled; nothing in the session attaches it
/// implicitly.
pub fn attach_debug_tap(manager: &CallSessionManager) -> DebugTap {
    let listeners = EventKind::ALL
        .into_iter()
        .map(|kind| {
            let listener: Listener = Arc::new(|event: &SessionEvent| {
                tracing::debug!(
                    target: "callsetter_session::debug",
                    event = %event.kind(),
                    payload = ?event,
                    "session event"
                );
            });
            manager.on(kind, listener.clone());
            (kind, listener)
        })
        .collect();
    tracing::info!("session debug tap attached");
    DebugTap { listeners }
}

/// Point-in-time view of a session for diagnostic endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDiagnostics {
    pub state: CallState,
    pub metrics: CallMetrics,
    pub ready: bool,
    pub readiness_reason: Option<String>,
    pub timer_running: bool,
    pub muted: bool,
    pub listener_counts: BTreeMap<String, usize>,
}

pub fn diagnostics(manager: &CallSessionManager) -> SessionDiagnostics {
    SessionDiagnostics {
        state: manager.state(),
        metrics: manager.metrics(),
        ready: manager.is_ready(),
        readiness_reason: manager.readiness().reason().map(str::to_string),
        timer_running: manager.is_timer_running(),
        muted: manager.is_muted(),
        listener_counts: EventKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str().to_string(), manager.listener_count(kind)))
            .collect(),
    }
}
