//! ElevenLabs text-to-speech.

use crate::error::GenAiError;
use crate::generator::{check_status, http_client, join_url};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";

/// Longest text accepted by a single synthesis request, in characters.
pub const MAX_TTS_CHARS: usize = 5000;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for ElevenLabsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GenAiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenAiError::Config("ElevenLabs API key is empty".to_string()));
        }
        Ok(Self {
            http: http_client()?,
            api_key,
            model: DEFAULT_ELEVENLABS_MODEL.to_string(),
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Renders `text` with `voice_id` and returns the encoded audio (MP3).
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, GenAiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GenAiError::InvalidInput("text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > MAX_TTS_CHARS {
            return Err(GenAiError::InvalidInput(format!(
                "text exceeds maximum length: {chars} characters (limit: {MAX_TTS_CHARS})"
            )));
        }
        if voice_id.is_empty() || !voice_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GenAiError::InvalidInput(format!(
                "invalid voice id: {voice_id:?}"
            )));
        }

        debug!(voice_id, chars, "elevenlabs synthesis");
        let response = self
            .http
            .post(join_url(
                &self.base_url,
                &format!("/v1/text-to-speech/{voice_id}"),
            ))
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SynthesisRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;
        let audio = check_status(response).await?.bytes().await?;
        if audio.is_empty() {
            return Err(GenAiError::EmptyResponse);
        }
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_text_is_rejected_before_any_request() {
        let client = ElevenLabsClient::new("key")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let text = "a".repeat(MAX_TTS_CHARS + 1);
        assert!(matches!(
            client.synthesize(&text, "voice1").await,
            Err(GenAiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn voice_id_must_be_alphanumeric() {
        let client = ElevenLabsClient::new("key").unwrap();
        assert!(matches!(
            client.synthesize("hello", "../admin").await,
            Err(GenAiError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_key_is_a_config_error() {
        assert!(matches!(
            ElevenLabsClient::new(""),
            Err(GenAiError::Config(_))
        ));
    }
}
