//! The call session state manager.
//!
//! [`CallSessionManager`] owns one voice SDK client, subscribes to every
//! spelling of its events, and turns them into state transitions on the
//! [`CallStateStore`] followed by broadcasts on the [`EventBus`]:
//!
//! ```text
//!            start_call()              call-start
//!   Idle ─────────────────► Connecting ───────────► InCall
//!    ▲                         │                       │
//!    │  failure / error /      │                       │ call-end
//!    │  timeout / end_call()   │                       │
//!    └─────────────────────────┴───────────────────────┘
//! ```
//!
//! A connection attempt cancelled by `end_call` or the connect timeout is
//! remembered: if the service accepts it anyway, or its `call-start` shows
//! up late, the remote call is stopped and the session stays Idle.
//!
//! `start_call` resolving only means the service accepted the request; the
//! move to `InCall` happens when the SDK's `call-start` event arrives.
//! Every operation reports failure through a [`CallResult`] and never
//! panics or returns `Err` to the caller.

use crate::bus::{EventBus, Listener};
use crate::config::{Readiness, SessionSettings};
use crate::error::SessionError;
use crate::event::{EventKind, SessionEvent};
use crate::normalize;
use crate::sdk::{OutboundMessage, SdkCallback, UnavailableSdk, VoiceSdk};
use crate::store::{CallStateStore, StartTransition};
use crate::timer::DurationTimer;
use callsetter_types::{CallConfig, CallMetrics, CallResult, CallState, Persona, TranscriptMessage};
use futures_util::FutureExt;
use serde_json::Value;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval between `call-duration-updated` events.
const DURATION_TICK: Duration = Duration::from_secs(1);

/// Owns the voice SDK, the call state store and the event bus.
///
/// Construct one per host and share it (typically behind an `Arc`).
/// Dropping it tears the session down.
pub struct CallSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    sdk: Arc<dyn VoiceSdk>,
    settings: SessionSettings,
    readiness: Readiness,
    bus: EventBus,
    store: CallStateStore,
    timer: DurationTimer,
    connect_timeout: Mutex<Option<JoinHandle<()>>>,
    sdk_callbacks: Mutex<Vec<(&'static str, SdkCallback)>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for CallSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionManager")
            .field("settings", &self.inner.settings)
            .field("readiness", &self.inner.readiness)
            .field("state", &self.inner.store.snapshot())
            .finish()
    }
}

impl CallSessionManager {
    /// Creates a manager around `sdk` and subscribes to its events.
    pub fn new(sdk: Arc<dyn VoiceSdk>, settings: SessionSettings) -> Self {
        let readiness = settings.readiness();
        Self::build(sdk, settings, readiness)
    }

    /// Creates a manager whose SDK failed to load. It reports not ready and
    /// refuses to start calls.
    pub fn without_sdk(settings: SessionSettings, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let readiness = Readiness::NotReady(format!("voice SDK unavailable: {reason}"));
        Self::build(Arc::new(UnavailableSdk { reason }), settings, readiness)
    }

    fn build(sdk: Arc<dyn VoiceSdk>, settings: SessionSettings, readiness: Readiness) -> Self {
        if let Readiness::NotReady(reason) = &readiness {
            warn!(reason = %reason, "voice session is not ready; calls are disabled");
        }
        let inner = Arc::new(Inner {
            sdk,
            settings,
            readiness,
            bus: EventBus::new(),
            store: CallStateStore::new(),
            timer: DurationTimer::new(),
            connect_timeout: Mutex::new(None),
            sdk_callbacks: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });
        Inner::subscribe_sdk(&inner);
        Self { inner }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn readiness(&self) -> &Readiness {
        &self.inner.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.inner.readiness.is_ready() && !self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CallState {
        self.inner.store.snapshot()
    }

    pub fn metrics(&self) -> CallMetrics {
        self.inner.store.metrics()
    }

    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.inner.bus.on(kind, listener);
    }

    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        self.inner.bus.off(kind, listener)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.bus.listener_count(kind)
    }

    pub fn is_timer_running(&self) -> bool {
        self.inner.timer.is_running()
    }

    /// Starts a call with the default assistant. A phone number dials out
    /// over PSTN instead of opening a web call.
    pub async fn start_call(&self, phone_number: Option<&str>) -> CallResult {
        self.start_call_with(self.config_for(None, phone_number))
            .await
    }

    /// Starts a call with a persona's assistant.
    pub async fn start_call_for_persona(
        &self,
        persona: &Persona,
        phone_number: Option<&str>,
    ) -> CallResult {
        debug!(persona = %persona.id, "starting call for persona");
        self.start_call_with(self.config_for(Some(&persona.assistant_id), phone_number))
            .await
    }

    fn config_for(&self, assistant_id: Option<&str>, phone_number: Option<&str>) -> CallConfig {
        let assistant_id = assistant_id.unwrap_or(&self.inner.settings.assistant_id);
        let config = CallConfig::web(assistant_id);
        match phone_number.map(str::trim).filter(|n| !n.is_empty()) {
            Some(number) => config.with_phone_number(number),
            None => config,
        }
    }

    /// Starts a call with an explicit configuration. A missing assistant id
    /// falls back to the configured default.
    pub async fn start_call_with(&self, mut config: CallConfig) -> CallResult {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return CallResult::failed("Call session has been shut down", None);
        }
        if let Readiness::NotReady(reason) = &self.inner.readiness {
            let err = SessionError::NotReady(reason.clone());
            warn!(error = %err, "refusing to start call");
            return CallResult::failed("Voice service is not ready", Some(err.to_string()));
        }
        if config.assistant_id.as_deref().map_or(true, str::is_empty) {
            config.assistant_id = Some(self.inner.settings.assistant_id.clone());
        }

        let Some(attempt) = self.inner.store.begin_connecting() else {
            let err = SessionError::AlreadyActive;
            debug!("{err}");
            return CallResult::failed("A call is already in progress", Some(err.to_string()));
        };

        info!(attempt, phone = config.is_phone_call(), "starting call");
        self.inner.emit_state_changed();
        Inner::arm_connect_timeout(&self.inner, attempt);

        let outcome = AssertUnwindSafe(self.inner.sdk.start(&config))
            .catch_unwind()
            .await;
        let (err, raw) = match outcome {
            Ok(Ok(())) if self.inner.store.is_abandoned(attempt) => {
                let err = SessionError::Cancelled;
                info!(attempt, "call request accepted after cancellation; ending it");
                self.inner.stop_abandoned().await;
                return CallResult::failed("Connection attempt cancelled", Some(err.to_string()));
            }
            Ok(Ok(())) => {
                debug!(attempt, "call request accepted; waiting for call-start");
                return CallResult::ok("Call request accepted; connecting");
            }
            Ok(Err(sdk_err)) => {
                let raw = sdk_err.to_string();
                (SessionError::StartFailed(sdk_err), raw)
            }
            Err(_) => {
                let err = SessionError::Panicked("starting a call");
                let raw = err.to_string();
                (err, raw)
            }
        };

        warn!(attempt, error = %err, "call start failed");
        if self.inner.store.abort_connecting(Some(attempt)) {
            self.inner.disarm_connect_timeout();
            self.inner.emit_state_changed();
        }
        CallResult::failed(err.to_string(), Some(raw))
    }

    /// Ends the active call, or aborts a connection attempt in progress.
    ///
    /// For an established call the state resets when the SDK's `call-end`
    /// event arrives. A connection attempt is aborted immediately.
    pub async fn end_call(&self) -> CallResult {
        let state = self.inner.store.snapshot();
        if state.is_idle() {
            let err = SessionError::NothingToEnd;
            debug!("{err}");
            return CallResult::failed("No active call to end", Some(err.to_string()));
        }

        let aborted = self.inner.store.cancel_connecting(None);
        if aborted {
            info!("connection attempt cancelled");
            self.inner.disarm_connect_timeout();
            self.inner.emit_state_changed();
        }

        let outcome = AssertUnwindSafe(self.inner.sdk.stop())
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(SessionError::Panicked("ending a call").to_string()),
        };

        match (aborted, failure) {
            (true, failure) => {
                if let Some(err) = failure {
                    debug!(error = %err, "stop during connection attempt failed");
                }
                CallResult::ok("Connection attempt cancelled")
            }
            (false, None) => CallResult::ok("Call end requested"),
            (false, Some(err)) => {
                warn!(error = %err, "failed to end call");
                CallResult::failed("Failed to end call", Some(err))
            }
        }
    }

    /// Mutes or unmutes. Failures are logged, never propagated.
    pub async fn set_muted(&self, muted: bool) -> CallResult {
        match AssertUnwindSafe(self.inner.sdk.set_muted(muted))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {
                debug!(muted, "mute state updated");
                CallResult::ok(if muted { "Muted" } else { "Unmuted" })
            }
            Ok(Err(err)) => {
                warn!(muted, error = %err, "failed to change mute state");
                CallResult::failed("Failed to change mute state", Some(err.to_string()))
            }
            Err(_) => {
                let err = SessionError::Panicked("changing mute state");
                warn!(muted, error = %err, "failed to change mute state");
                CallResult::failed("Failed to change mute state", Some(err.to_string()))
            }
        }
    }

    /// Flips the mute state and returns the state now in effect.
    pub async fn toggle_mute(&self) -> bool {
        let target = !self.is_muted();
        if self.set_muted(target).await.success {
            target
        } else {
            !target
        }
    }

    /// Current mute state; `false` when the SDK cannot say.
    pub fn is_muted(&self) -> bool {
        self.inner.sdk.is_muted().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read mute state");
            false
        })
    }

    /// Injects a system message into the live conversation.
    ///
    /// Callers are expected to only offer this while a call is active.
    pub async fn send_message(&self, text: &str) -> CallResult {
        let message = OutboundMessage::system(text);
        match AssertUnwindSafe(self.inner.sdk.send(&message))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => CallResult::ok("Message sent"),
            Ok(Err(err)) => {
                warn!(error = %err, "failed to send message");
                CallResult::failed("Failed to send message", Some(err.to_string()))
            }
            Err(_) => {
                let err = SessionError::Panicked("sending a message");
                CallResult::failed("Failed to send message", Some(err.to_string()))
            }
        }
    }

    /// Feeds an external SDK event through the normalisation table.
    ///
    /// SDK callbacks registered at construction call this; hosts that
    /// receive events some other way can call it directly.
    pub fn handle_sdk_event(&self, external: &str, payload: Value) {
        Inner::handle_sdk_event(&self.inner, external, payload);
    }

    /// Returns the session to Idle and releases everything it holds: the
    /// duration timer, the connect timeout, SDK subscriptions and bus
    /// listeners. Subscribers get one last `call-state-changed` if a call
    /// was in progress. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.timer.stop();
        self.inner.disarm_connect_timeout();
        self.inner.unsubscribe_sdk();
        if self.inner.store.mark_ended() {
            self.inner.emit_state_changed();
        }
        self.inner.bus.clear();
        info!("call session destroyed");
    }

    /// Ends any active call, then destroys the session.
    pub async fn shutdown(&self) {
        if !self.inner.store.snapshot().is_idle() {
            let result = self.end_call().await;
            debug!(success = result.success, message = %result.message, "ended call during shutdown");
        }
        self.destroy();
    }
}

impl Drop for CallSessionManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Inner {
    fn subscribe_sdk(this: &Arc<Self>) {
        let mut callbacks = this
            .sdk_callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for name in normalize::external_names() {
            let weak = Arc::downgrade(this);
            let callback: SdkCallback = Arc::new(move |payload: Value| {
                if let Some(inner) = weak.upgrade() {
                    Inner::handle_sdk_event(&inner, name, payload);
                }
            });
            this.sdk.on(name, callback.clone());
            callbacks.push((name, callback));
        }
    }

    fn unsubscribe_sdk(&self) {
        let callbacks = std::mem::take(
            &mut *self
                .sdk_callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (name, callback) in callbacks {
            self.sdk.off(name, &callback);
        }
    }

    fn emit_state_changed(&self) {
        self.bus
            .emit(&SessionEvent::CallStateChanged(self.store.snapshot()));
    }

    fn handle_sdk_event(this: &Arc<Self>, external: &str, payload: Value) {
        if this.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let Some(kind) = normalize::internal_kind(external) else {
            debug!(external, "ignoring unrecognised voice SDK event");
            return;
        };
        debug!(external, event = %kind, "voice SDK event");

        match kind {
            EventKind::CallStart => Inner::on_call_start(this),
            EventKind::CallEnd => this.on_call_end(),
            EventKind::SpeechStart => {
                this.store.set_user_speaking(true);
                this.bus.emit(&SessionEvent::SpeechStart);
            }
            EventKind::SpeechEnd => {
                this.store.set_user_speaking(false);
                this.bus.emit(&SessionEvent::SpeechEnd);
            }
            EventKind::Message => {
                let message = TranscriptMessage::from_value(payload);
                if message.is_assistant_transcript() {
                    this.bus.emit(&SessionEvent::Message(message.clone()));
                    this.bus.emit(&SessionEvent::AssistantMessage(message));
                } else {
                    this.bus.emit(&SessionEvent::Message(message));
                }
            }
            EventKind::VolumeLevel => match volume_from(&payload).and_then(|v| this.store.set_audio_level(v)) {
                Some(level) => {
                    this.bus.emit(&SessionEvent::VolumeLevel(level));
                }
                None => debug!(payload = %payload, "ignoring malformed volume level"),
            },
            EventKind::Error => {
                let message = error_message(&payload);
                warn!(error = %message, "voice SDK reported an error");
                let aborted = this.store.abort_connecting(None);
                if aborted {
                    this.disarm_connect_timeout();
                }
                this.bus.emit(&SessionEvent::Error(message));
                if aborted {
                    this.emit_state_changed();
                }
            }
            EventKind::AssistantMessage
            | EventKind::CallStateChanged
            | EventKind::CallDurationUpdated => {
                debug!(event = %kind, "internal-only event arrived from SDK; ignored");
            }
        }
    }

    fn on_call_start(this: &Arc<Self>) {
        this.disarm_connect_timeout();
        match this.store.mark_started() {
            StartTransition::Started => info!("call started"),
            StartTransition::Duplicate => {
                debug!("duplicate call-start ignored");
                return;
            }
            StartTransition::Cancelled => {
                info!("call came up after its attempt was cancelled; ending it");
                let weak = Arc::downgrade(this);
                match Handle::try_current() {
                    Ok(runtime) => {
                        runtime.spawn(async move {
                            if let Some(inner) = weak.upgrade() {
                                inner.stop_abandoned().await;
                            }
                        });
                    }
                    Err(_) => warn!("no tokio runtime available; cancelled call not stopped"),
                }
                return;
            }
        }

        let weak = Arc::downgrade(this);
        this.timer.start(DURATION_TICK, move || {
            let Some(inner) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            match inner.store.refresh_duration() {
                Some(seconds) => {
                    inner.bus.emit(&SessionEvent::CallDurationUpdated(seconds));
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        });

        this.bus.emit(&SessionEvent::CallStart);
        this.emit_state_changed();
    }

    fn on_call_end(&self) {
        self.disarm_connect_timeout();
        self.timer.stop();
        if !self.store.mark_ended() {
            debug!("call-end without an active call ignored");
            return;
        }
        info!("call ended");
        self.bus.emit(&SessionEvent::CallEnd);
        self.emit_state_changed();
    }

    /// Best-effort stop for a call nobody is waiting for any more.
    async fn stop_abandoned(&self) {
        match AssertUnwindSafe(self.sdk.stop()).catch_unwind().await {
            Ok(Ok(())) => debug!("abandoned call stopped"),
            Ok(Err(err)) => debug!(error = %err, "stopping abandoned call failed"),
            Err(_) => {
                let err = SessionError::Panicked("stopping an abandoned call");
                warn!(error = %err, "stopping abandoned call failed");
            }
        }
    }

    fn arm_connect_timeout(this: &Arc<Self>, attempt: u64) {
        let Some(timeout) = this.settings.connect_timeout() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!("no tokio runtime available; connect timeout not armed");
            return;
        };

        let weak = Arc::downgrade(this);
        let task = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.store.cancel_connecting(Some(attempt)) {
                return;
            }
            let err = SessionError::ConnectTimeout(timeout.as_secs());
            warn!(attempt, error = %err, "connection attempt timed out");
            inner.bus.emit(&SessionEvent::Error(err.to_string()));
            inner.emit_state_changed();
            inner.stop_abandoned().await;
        });

        let previous = this
            .connect_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn disarm_connect_timeout(&self) {
        let handle = self
            .connect_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Accepts `0.42`, `{"volume": 0.42}` or `{"level": 0.42}`.
fn volume_from(payload: &Value) -> Option<f32> {
    payload
        .as_f64()
        .or_else(|| payload.get("volume").and_then(Value::as_f64))
        .or_else(|| payload.get("level").and_then(Value::as_f64))
        .map(|v| v as f32)
}

/// Best-effort human-readable text for an SDK error payload.
fn error_message(payload: &Value) -> String {
    if let Some(text) = payload.as_str() {
        return text.to_string();
    }
    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/error/message").and_then(Value::as_str))
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn volume_payload_shapes() {
        assert_eq!(volume_from(&json!(0.25)), Some(0.25));
        assert_eq!(volume_from(&json!({"volume": 0.5})), Some(0.5));
        assert_eq!(volume_from(&json!({"level": 1})), Some(1.0));
        assert_eq!(volume_from(&json!("loud")), None);
    }

    #[test]
    fn error_payload_shapes() {
        assert_eq!(error_message(&json!("mic denied")), "mic denied");
        assert_eq!(error_message(&json!({"message": "bad key"})), "bad key");
        assert_eq!(
            error_message(&json!({"error": {"message": "ice failed"}})),
            "ice failed"
        );
        assert_eq!(error_message(&json!({"error": "quota"})), "quota");
        assert_eq!(error_message(&json!({"code": 7})), r#"{"code":7}"#);
    }
}
