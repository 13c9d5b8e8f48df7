use crate::anthropic::{AnthropicClient, DEFAULT_ANTHROPIC_MODEL};
use crate::elevenlabs::ElevenLabsClient;
use crate::error::GenAiError;
use crate::generator::TextGenerator;
use crate::message::CompletionOptions;
use crate::openai::{OpenAiClient, DEFAULT_OPENAI_MODEL};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
}

fn default_max_tokens() -> u32 {
    CompletionOptions::default().max_tokens
}

fn default_temperature() -> f32 {
    CompletionOptions::default().temperature
}

/// Text generation settings, the `[genai]` config section.
#[derive(Clone, Serialize, Deserialize)]
pub struct GenAiConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Falls back to the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenAiConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: String::new(),
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl fmt::Debug for GenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenAiConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GenAiConfig {
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Speech synthesis settings, the `[tts]` config section.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Voice used when a request names none.
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("api_key", &"[REDACTED]")
            .field("voice_id", &self.voice_id)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builds the ElevenLabs client for a `[tts]` section.
pub fn build_speech_client(config: &TtsConfig) -> Result<ElevenLabsClient, GenAiError> {
    let mut client = ElevenLabsClient::new(config.api_key.clone())?;
    if let Some(model) = &config.model {
        client = client.with_model(model);
    }
    if let Some(url) = &config.base_url {
        client = client.with_base_url(url);
    }
    tracing::info!(default_voice = ?config.voice_id, "speech synthesis configured");
    Ok(client)
}

/// Builds the configured provider's client.
pub fn build_generator(config: &GenAiConfig) -> Result<Arc<dyn TextGenerator>, GenAiError> {
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(GenAiError::Config(format!(
            "temperature must be between 0.0 and 2.0, got {}",
            config.temperature
        )));
    }
    if config.max_tokens == 0 {
        return Err(GenAiError::Config("max_tokens must be positive".to_string()));
    }

    let generator: Arc<dyn TextGenerator> = match config.provider {
        Provider::OpenAi => {
            let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            let client = OpenAiClient::new(config.api_key.clone(), model)?;
            match &config.base_url {
                Some(url) => Arc::new(client.with_base_url(url)),
                None => Arc::new(client),
            }
        }
        Provider::Anthropic => {
            let model = config.model.as_deref().unwrap_or(DEFAULT_ANTHROPIC_MODEL);
            let client = AnthropicClient::new(config.api_key.clone(), model)?;
            match &config.base_url {
                Some(url) => Arc::new(client.with_base_url(url)),
                None => Arc::new(client),
            }
        }
    };
    tracing::info!(provider = generator.provider(), "text generator configured");
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_defaults() {
        let config: GenAiConfig = parse(r#"{"api_key": "k"}"#);
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.max_tokens, 512);
        assert!(config.model.is_none());
    }

    #[test]
    fn builds_each_provider() {
        let mut config = GenAiConfig {
            api_key: "k".into(),
            ..GenAiConfig::default()
        };
        assert_eq!(build_generator(&config).unwrap().provider(), "openai");
        config.provider = Provider::Anthropic;
        assert_eq!(build_generator(&config).unwrap().provider(), "anthropic");
    }

    #[test]
    fn rejects_bad_settings() {
        let config = GenAiConfig::default();
        assert!(matches!(build_generator(&config), Err(GenAiError::Config(_))));

        let config = GenAiConfig {
            api_key: "k".into(),
            temperature: 3.5,
            ..GenAiConfig::default()
        };
        assert!(matches!(build_generator(&config), Err(GenAiError::Config(_))));
    }

    #[test]
    fn debug_redacts_key() {
        let config = GenAiConfig {
            api_key: "sk-secret".into(),
            ..GenAiConfig::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn speech_client_needs_a_key() {
        let config: TtsConfig = serde_json::from_str(r#"{"voice_id": "Rachel01"}"#).unwrap();
        assert!(matches!(
            build_speech_client(&config),
            Err(GenAiError::Config(_))
        ));

        let config = TtsConfig {
            api_key: "xi-secret".into(),
            ..config
        };
        assert!(build_speech_client(&config).is_ok());
        assert!(!format!("{config:?}").contains("xi-secret"));
    }

    fn parse(json: &str) -> GenAiConfig {
        serde_json::from_str(json).unwrap()
    }
}
