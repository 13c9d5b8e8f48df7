//! VAPI voice service client.
//!
//! Calls are created over VAPI's REST API and controlled through the
//! per-call `monitor.controlUrl`. Lifecycle, speech and transcript events
//! arrive as server webhooks, which the host hands to
//! [`VapiClient::ingest_webhook`]; the client translates them into SDK
//! event names and fires the callbacks registered through [`VoiceSdk::on`].

use crate::error::SdkError;
use crate::sdk::{OutboundMessage, SdkCallback, VoiceSdk};
use async_trait::async_trait;
use callsetter_types::CallConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_VAPI_BASE_URL: &str = "https://api.vapi.ai";

/// Timeout applied to every REST request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How many ended call ids are remembered to drop retried webhooks.
const ENDED_CALL_HISTORY: usize = 32;

fn default_base_url() -> String {
    DEFAULT_VAPI_BASE_URL.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VapiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// VAPI phone number used as caller id for PSTN dial-out.
    #[serde(default)]
    pub phone_number_id: Option<String>,
}

impl Default for VapiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            phone_number_id: None,
        }
    }
}

impl fmt::Debug for VapiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("phone_number_id", &self.phone_number_id)
            .finish()
    }
}

impl VapiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallResponse {
    id: String,
    #[serde(default)]
    monitor: Option<Monitor>,
    #[serde(default)]
    web_call_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Monitor {
    #[serde(default)]
    control_url: Option<String>,
}

/// The call created by the most recent successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCall {
    pub id: String,
    pub control_url: Option<String>,
    /// Browser join URL for web calls.
    pub web_call_url: Option<String>,
}

pub struct VapiClient {
    http: reqwest::Client,
    config: VapiConfig,
    handlers: RwLock<HashMap<String, Vec<SdkCallback>>>,
    active: Mutex<Option<ActiveCall>>,
    /// Most recent ended call ids, oldest first.
    ended: Mutex<VecDeque<String>>,
    muted: AtomicBool,
}

impl fmt::Debug for VapiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapiClient")
            .field("config", &self.config)
            .field("active", &self.active_call())
            .field("muted", &self.muted.load(Ordering::SeqCst))
            .finish()
    }
}

impl VapiClient {
    pub fn new(config: VapiConfig) -> Result<Self, SdkError> {
        if config.api_key.trim().is_empty() {
            return Err(SdkError::Config("VAPI API key is empty".to_string()));
        }
        if config.base_url.trim().is_empty() {
            return Err(SdkError::Config("VAPI base URL is empty".to_string()));
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            config,
            handlers: RwLock::new(HashMap::new()),
            active: Mutex::new(None),
            ended: Mutex::new(VecDeque::with_capacity(ENDED_CALL_HISTORY)),
            muted: AtomicBool::new(false),
        })
    }

    pub fn active_call(&self) -> Option<ActiveCall> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn has_ended(&self, call_id: &str) -> bool {
        self.ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|id| id == call_id)
    }

    /// Clears the active call and remembers `call_id` (or the active call's
    /// id) as ended.
    fn finish_call(&self, call_id: Option<&str>) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.muted.store(false, Ordering::SeqCst);

        let Some(id) = call_id
            .map(str::to_string)
            .or_else(|| previous.map(|call| call.id))
        else {
            return;
        };
        let mut ended = self.ended.lock().unwrap_or_else(PoisonError::into_inner);
        if ended.len() == ENDED_CALL_HISTORY {
            ended.pop_front();
        }
        ended.push_back(id);
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<reqwest::Response, SdkError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Sends a live-call control message to the active call.
    async fn control(&self, body: Value) -> Result<(), SdkError> {
        let control_url = self
            .active_call()
            .and_then(|call| call.control_url)
            .ok_or(SdkError::NoActiveCall)?;
        self.post_json(&control_url, &body).await?;
        Ok(())
    }

    /// Translates a VAPI server webhook into an SDK event and fires it.
    ///
    /// Accepts either the full webhook body (`{"message": {...}}`) or the
    /// bare message. Returns the SDK event name fired, if any.
    pub fn ingest_webhook(&self, body: &Value) -> Option<&'static str> {
        let message = body.get("message").unwrap_or(body);
        let kind = message.get("type").and_then(Value::as_str).unwrap_or_default();
        let status = message.get("status").and_then(Value::as_str);

        let call_id = message.pointer("/call/id").and_then(Value::as_str);
        if let Some(call_id) = call_id {
            if self.has_ended(call_id) {
                debug!(call_id, "ignoring webhook for a call that already ended");
                return None;
            }
            if let Some(active) = self.active_call() {
                if active.id != call_id {
                    debug!(call_id, active = %active.id, "ignoring webhook for another call");
                    return None;
                }
            }
        }

        let (event, payload) = match (kind, status) {
            ("status-update", Some("in-progress")) => ("call-start", message.clone()),
            ("status-update", Some("ended")) => {
                self.finish_call(call_id);
                ("call-end", message.clone())
            }
            ("status-update", other) => {
                debug!(status = ?other, "ignoring call status update");
                return None;
            }
            ("speech-update", Some("started")) => ("speech-start", message.clone()),
            ("speech-update", Some("stopped")) => ("speech-end", message.clone()),
            ("speech-update", other) => {
                debug!(status = ?other, "ignoring speech update");
                return None;
            }
            ("hang", _) => (
                "error",
                json!({"message": "assistant stopped responding", "raw": message}),
            ),
            _ => ("message", message.clone()),
        };

        debug!(webhook = kind, event, "vapi webhook");
        self.fire(event, payload);
        Some(event)
    }

    fn fire(&self, event: &str, payload: Value) {
        let callbacks = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(payload.clone());
        }
    }
}

#[async_trait]
impl VoiceSdk for VapiClient {
    async fn start(&self, config: &CallConfig) -> Result<(), SdkError> {
        let assistant_id = config
            .assistant_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SdkError::Config("no assistant id given".to_string()))?;

        let (url, body) = match &config.customer {
            Some(customer) => {
                let mut body = json!({
                    "assistantId": assistant_id,
                    "customer": { "number": customer.number },
                });
                if let Some(phone_number_id) = &self.config.phone_number_id {
                    body["phoneNumberId"] = json!(phone_number_id);
                }
                (self.endpoint("/call"), body)
            }
            None => (
                self.endpoint("/call/web"),
                json!({ "assistantId": assistant_id }),
            ),
        };

        let created: CreateCallResponse = self.post_json(&url, &body).await?.json().await?;
        info!(call_id = %created.id, phone = config.is_phone_call(), "vapi call created");

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveCall {
            id: created.id,
            control_url: created.monitor.and_then(|m| m.control_url),
            web_call_url: created.web_call_url,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), SdkError> {
        self.control(json!({ "type": "end-call" })).await
    }

    async fn set_muted(&self, muted: bool) -> Result<(), SdkError> {
        let control = if muted {
            "mute-assistant"
        } else {
            "unmute-assistant"
        };
        self.control(json!({ "type": "control", "control": control }))
            .await?;
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    fn is_muted(&self) -> Result<bool, SdkError> {
        Ok(self.muted.load(Ordering::SeqCst))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SdkError> {
        self.control(json!({
            "type": "add-message",
            "message": { "role": message.role, "content": message.content },
            "triggerResponseEnabled": true,
        }))
        .await
    }

    fn on(&self, event: &str, callback: SdkCallback) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }

    fn off(&self, event: &str, callback: &SdkCallback) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(event) {
            if let Some(index) = list.iter().position(|c| Arc::ptr_eq(c, callback)) {
                list.remove(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VapiClient {
        VapiClient::new(VapiConfig::new("test-key")).unwrap()
    }

    fn capture(client: &VapiClient, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.on(
            event,
            Arc::new(move |payload: Value| sink.lock().unwrap().push(payload)),
        );
        seen
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            VapiClient::new(VapiConfig::new("  ")),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn status_updates_map_to_lifecycle_events() {
        let client = client();
        let starts = capture(&client, "call-start");
        let ends = capture(&client, "call-end");

        let started = json!({"message": {"type": "status-update", "status": "in-progress"}});
        assert_eq!(client.ingest_webhook(&started), Some("call-start"));

        let ringing = json!({"message": {"type": "status-update", "status": "ringing"}});
        assert_eq!(client.ingest_webhook(&ringing), None);

        let ended = json!({"type": "status-update", "status": "ended"});
        assert_eq!(client.ingest_webhook(&ended), Some("call-end"));

        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(ends.lock().unwrap().len(), 1);
    }

    #[test]
    fn ended_calls_are_remembered_up_to_a_limit() {
        let client = client();
        *client.active.lock().unwrap() = Some(ActiveCall {
            id: "call-0".into(),
            control_url: None,
            web_call_url: None,
        });
        // no id on the webhook: the active call's id is recorded
        client.ingest_webhook(&json!({"type": "status-update", "status": "ended"}));
        assert!(client.has_ended("call-0"));

        for n in 1..=ENDED_CALL_HISTORY {
            let ended = json!({"type": "status-update", "status": "ended", "call": {"id": format!("call-{n}")}});
            assert_eq!(client.ingest_webhook(&ended), Some("call-end"));
        }
        assert!(!client.has_ended("call-0"));
        assert!(client.has_ended("call-1"));

        let retried = json!({"type": "transcript", "call": {"id": "call-1"}});
        assert_eq!(client.ingest_webhook(&retried), None);
    }

    #[test]
    fn speech_transcript_and_hang_webhooks() {
        let client = client();
        let messages = capture(&client, "message");
        let errors = capture(&client, "error");

        let speech = json!({"message": {"type": "speech-update", "status": "started", "role": "user"}});
        assert_eq!(client.ingest_webhook(&speech), Some("speech-start"));
        let stopped = json!({"message": {"type": "speech-update", "status": "stopped"}});
        assert_eq!(client.ingest_webhook(&stopped), Some("speech-end"));

        let transcript = json!({"message": {
            "type": "transcript",
            "role": "assistant",
            "transcriptType": "final",
            "transcript": "Does Tuesday at ten work?"
        }});
        assert_eq!(client.ingest_webhook(&transcript), Some("message"));
        assert_eq!(messages.lock().unwrap()[0]["transcript"], "Does Tuesday at ten work?");

        assert_eq!(
            client.ingest_webhook(&json!({"message": {"type": "hang"}})),
            Some("error")
        );
        assert_eq!(
            errors.lock().unwrap()[0]["message"],
            "assistant stopped responding"
        );
    }

    #[test]
    fn off_unregisters_the_matching_callback() {
        let client = client();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let callback: SdkCallback = Arc::new(move |_| *sink.lock().unwrap() += 1);
        client.on("call-start", callback.clone());
        client.off("call-start", &callback);

        client.ingest_webhook(&json!({"type": "status-update", "status": "in-progress"}));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn control_without_active_call_fails() {
        let client = client();
        assert!(matches!(client.stop().await, Err(SdkError::NoActiveCall)));
        assert!(matches!(
            client.set_muted(true).await,
            Err(SdkError::NoActiveCall)
        ));
        assert!(!client.is_muted().unwrap());
    }
}
