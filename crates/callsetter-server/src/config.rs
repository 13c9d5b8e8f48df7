//! Server configuration loading from file and environment variables.

use callsetter_genai::{GenAiConfig, TtsConfig};
use callsetter_session::{SessionSettings, VapiConfig, DEFAULT_VAPI_BASE_URL};
use callsetter_types::Persona;
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Voice service and call session settings.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Personas offered to visitors.
    #[serde(default)]
    pub personas: Vec<Persona>,

    /// Text generation. Content endpoints are disabled when absent.
    #[serde(default)]
    pub genai: Option<GenAiConfig>,

    /// Speech synthesis. The speech endpoint is disabled when absent.
    #[serde(default)]
    pub tts: Option<TtsConfig>,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callsetter_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// The `[voice]` section.
#[derive(Clone, Deserialize)]
pub struct VoiceConfig {
    /// Assistant id, public key, connect timeout and debug flag.
    #[serde(flatten)]
    pub session: SessionSettings,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Private API key for server-side calls. Falls back to the public key.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// Shared secret VAPI sends in `x-vapi-secret` with every webhook.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_VAPI_BASE_URL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            api_base_url: default_api_base_url(),
            api_key: None,
            phone_number_id: None,
            webhook_secret: None,
        }
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("session", &self.session)
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("phone_number_id", &self.phone_number_id)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl VoiceConfig {
    /// Client settings for the VAPI REST API.
    pub fn vapi_config(&self) -> VapiConfig {
        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| self.session.public_key.clone());
        VapiConfig {
            base_url: self.api_base_url.clone(),
            api_key,
            phone_number_id: self.phone_number_id.clone(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two personas share an id.
    #[error("duplicate persona id: {0}")]
    DuplicatePersona(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLSETTER_HOST` overrides `server.host`
/// - `CALLSETTER_PORT` overrides `server.port`
/// - `CALLSETTER_LOG_LEVEL` overrides `logging.level`
/// - `CALLSETTER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CALLSETTER_ASSISTANT_ID` overrides `voice.assistant_id`
/// - `CALLSETTER_PUBLIC_KEY` overrides `voice.public_key`
/// - `CALLSETTER_VAPI_API_KEY` overrides `voice.api_key`
/// - `CALLSETTER_WEBHOOK_SECRET` overrides `voice.webhook_secret`
/// - `CALLSETTER_VOICE_DEBUG` overrides `voice.debug`
/// - `CALLSETTER_GENAI_API_KEY` overrides `genai.api_key`, enabling the
///   section with defaults if the file has none
/// - `CALLSETTER_TTS_API_KEY` overrides `tts.api_key`, likewise
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    check_personas(&config.personas)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    let flag = |value: String| value == "true" || value == "1";

    if let Some(parsed) = var("CALLSETTER_HOST").and_then(|host| host.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("CALLSETTER_PORT").and_then(|port| port.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(level) = var("CALLSETTER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CALLSETTER_LOG_JSON") {
        config.logging.json = flag(json);
    }
    if let Some(id) = var("CALLSETTER_ASSISTANT_ID") {
        config.voice.session.assistant_id = id;
    }
    if let Some(key) = var("CALLSETTER_PUBLIC_KEY") {
        config.voice.session.public_key = key;
    }
    if let Some(key) = var("CALLSETTER_VAPI_API_KEY") {
        config.voice.api_key = Some(key);
    }
    if let Some(secret) = var("CALLSETTER_WEBHOOK_SECRET") {
        config.voice.webhook_secret = Some(secret);
    }
    if let Some(debug) = var("CALLSETTER_VOICE_DEBUG") {
        config.voice.session.debug = flag(debug);
    }
    if let Some(key) = var("CALLSETTER_GENAI_API_KEY") {
        config.genai.get_or_insert_with(GenAiConfig::default).api_key = key;
    }
    if let Some(key) = var("CALLSETTER_TTS_API_KEY") {
        config.tts.get_or_insert_with(TtsConfig::default).api_key = key;
    }
}

fn check_personas(personas: &[Persona]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for persona in personas {
        if !seen.insert(persona.id.as_str()) {
            return Err(ConfigError::DuplicatePersona(persona.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
port = 8080

[voice]
assistant_id = "5b7c1a9e-3f2d-4c8b-9a61-0d2e4f6a8b1c"
public_key = "9f8e7d6c-5b4a-4938-8271-605f4e3d2c1b"
connect_timeout_secs = 10
webhook_secret = "hook-secret"

[[personas]]
id = "grace"
name = "Grace"
assistant_id = "c0ffee00-1111-4222-8333-444455556666"
description = "Friendly scheduling assistant"

[genai]
provider = "anthropic"
api_key = "ak-test"

[tts]
api_key = "xi-test"
voice_id = "Rachel01"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_every_section() {
        let file = write_config(SAMPLE);
        let config = load_config(file.path().to_str()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.voice.session.connect_timeout_secs, Some(10));
        assert_eq!(config.voice.webhook_secret.as_deref(), Some("hook-secret"));
        assert_eq!(config.voice.api_base_url, DEFAULT_VAPI_BASE_URL);
        assert_eq!(config.personas[0].id, "grace");
        assert_eq!(
            config.genai.unwrap().provider,
            callsetter_genai::Provider::Anthropic
        );
        assert_eq!(config.tts.unwrap().voice_id.as_deref(), Some("Rachel01"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = load_config(Some("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.voice.session.connect_timeout_secs, Some(30));
        assert!(config.personas.is_empty());
        assert!(config.tts.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[server\nport = ");
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn duplicate_personas_are_rejected() {
        let file = write_config(
            r#"
[[personas]]
id = "max"
name = "Max"
assistant_id = "a"

[[personas]]
id = "max"
name = "Max Two"
assistant_id = "b"
"#,
        );
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::DuplicatePersona(id)) if id == "max"
        ));
    }

    #[test]
    fn environment_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("CALLSETTER_PORT", "9090"),
            ("CALLSETTER_LOG_JSON", "1"),
            ("CALLSETTER_ASSISTANT_ID", "from-env"),
            ("CALLSETTER_VOICE_DEBUG", "true"),
            ("CALLSETTER_GENAI_API_KEY", "sk-env"),
            ("CALLSETTER_TTS_API_KEY", "xi-env"),
            ("CALLSETTER_HOST", "not an ip"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, default_host());
        assert!(config.logging.json);
        assert_eq!(config.voice.session.assistant_id, "from-env");
        assert!(config.voice.session.debug);
        assert_eq!(config.genai.unwrap().api_key, "sk-env");
        assert_eq!(config.tts.unwrap().api_key, "xi-env");
    }

    #[test]
    fn vapi_key_falls_back_to_public_key() {
        let mut voice = VoiceConfig::default();
        voice.session.public_key = "pub".into();
        assert_eq!(voice.vapi_config().api_key, "pub");
        voice.api_key = Some("private".into());
        assert_eq!(voice.vapi_config().api_key, "private");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut voice = VoiceConfig::default();
        voice.webhook_secret = Some("hook-secret".into());
        voice.api_key = Some("private".into());
        let rendered = format!("{voice:?}");
        assert!(!rendered.contains("hook-secret"));
        assert!(!rendered.contains("private"));
    }
}
