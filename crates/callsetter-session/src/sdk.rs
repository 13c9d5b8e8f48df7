//! The voice SDK collaborator seam.

use crate::error::SdkError;
use async_trait::async_trait;
use callsetter_types::CallConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Callback the SDK invokes with an event's raw payload.
pub type SdkCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// A message injected into a live conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: String,
    pub content: String,
}

impl OutboundMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// A hosted voice-AI service client.
///
/// `start` resolving only means the service accepted the request. The call
/// is established when the SDK later fires its `call-start` event through a
/// callback registered with [`VoiceSdk::on`].
#[async_trait]
pub trait VoiceSdk: Send + Sync {
    async fn start(&self, config: &CallConfig) -> Result<(), SdkError>;

    async fn stop(&self) -> Result<(), SdkError>;

    async fn set_muted(&self, muted: bool) -> Result<(), SdkError>;

    fn is_muted(&self) -> Result<bool, SdkError>;

    async fn send(&self, message: &OutboundMessage) -> Result<(), SdkError>;

    /// Registers `callback` for the SDK event `event`.
    fn on(&self, event: &str, callback: SdkCallback);

    /// Unregisters a callback previously passed to [`VoiceSdk::on`].
    fn off(&self, event: &str, callback: &SdkCallback);
}

/// Stand-in used when the real SDK could not be constructed. Every
/// operation fails with [`SdkError::Unavailable`].
#[derive(Debug)]
pub(crate) struct UnavailableSdk {
    pub(crate) reason: String,
}

#[async_trait]
impl VoiceSdk for UnavailableSdk {
    async fn start(&self, _config: &CallConfig) -> Result<(), SdkError> {
        Err(SdkError::Unavailable(self.reason.clone()))
    }

    async fn stop(&self) -> Result<(), SdkError> {
        Err(SdkError::Unavailable(self.reason.clone()))
    }

    async fn set_muted(&self, _muted: bool) -> Result<(), SdkError> {
        Err(SdkError::Unavailable(self.reason.clone()))
    }

    fn is_muted(&self) -> Result<bool, SdkError> {
        Err(SdkError::Unavailable(self.reason.clone()))
    }

    async fn send(&self, _message: &OutboundMessage) -> Result<(), SdkError> {
        Err(SdkError::Unavailable(self.reason.clone()))
    }

    fn on(&self, _event: &str, _callback: SdkCallback) {}

    fn off(&self, _event: &str, _callback: &SdkCallback) {}
}
