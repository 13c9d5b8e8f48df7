//! Call lifecycle records.
//!
//! `CallState` is the aggregate snapshot subscribers receive with every
//! `call-state-changed` event. Field names serialise in camelCase because
//! the snapshot is consumed by browser widgets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Aggregate state of the single call session.
///
/// Invariants maintained by the session store:
/// - `in_call` and `is_connecting` are never both true.
/// - `call_start_time` is `Some` iff `in_call`.
/// - `call_duration` is `0` whenever `in_call` is false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallState {
    pub in_call: bool,
    pub is_connecting: bool,
    /// Whole seconds since the call was established.
    pub call_duration: u64,
    pub call_start_time: Option<DateTime<Utc>>,
}

/// Coarse lifecycle phase derived from a [`CallState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Idle,
    Connecting,
    InCall,
}

impl CallState {
    /// Returns the lifecycle phase for this snapshot.
    pub fn phase(&self) -> CallPhase {
        if self.in_call {
            CallPhase::InCall
        } else if self.is_connecting {
            CallPhase::Connecting
        } else {
            CallPhase::Idle
        }
    }

    /// True when neither connecting nor in a call.
    pub fn is_idle(&self) -> bool {
        self.phase() == CallPhase::Idle
    }
}

/// Ephemeral audio metrics reported by the voice service during a call.
///
/// Both fields are `None` until the first matching event of a call and are
/// cleared again when the call ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetrics {
    /// Normalised audio level in `0.0..=1.0`.
    pub audio_level: Option<f32>,
    pub is_user_speaking: Option<bool>,
}

impl CallMetrics {
    pub fn is_empty(&self) -> bool {
        self.audio_level.is_none() && self.is_user_speaking.is_none()
    }
}

/// Phone number to dial for an outbound PSTN call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub number: String,
}

/// Configuration handed to the voice service when starting a call.
///
/// Omitting `customer` starts a browser (web) call instead of dialing out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
}

impl CallConfig {
    pub fn web(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: Some(assistant_id.into()),
            customer: None,
        }
    }

    pub fn with_phone_number(mut self, number: impl Into<String>) -> Self {
        self.customer = Some(Customer {
            number: number.into(),
        });
        self
    }

    pub fn is_phone_call(&self) -> bool {
        self.customer.is_some()
    }
}

/// Outcome of a session operation.
///
/// Session operations never return `Err`; failures are reported here with a
/// human-readable `message` and, when one exists, the underlying error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error,
        }
    }
}

/// A transcript or conversation message forwarded from the voice service.
///
/// Parsed leniently: every field is optional and the original payload is
/// kept in `raw` for consumers that need more.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub role: Option<String>,
    pub transcript: Option<String>,
    /// `partial` or `final` for streaming transcripts.
    pub transcript_type: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl TranscriptMessage {
    /// Builds a message from an arbitrary SDK payload.
    pub fn from_value(value: Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            kind: text("type"),
            role: text("role"),
            transcript: text("transcript"),
            transcript_type: text("transcriptType"),
            raw: value,
        }
    }

    /// True for assistant transcripts, the ones shown as the assistant's
    /// side of the conversation.
    pub fn is_assistant_transcript(&self) -> bool {
        self.role.as_deref() == Some("assistant") && self.kind.as_deref() == Some("transcript")
    }
}
