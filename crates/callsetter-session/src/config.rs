//! Session settings and the readiness check run on them at startup.
//!
//! Identifiers still holding a template placeholder leave the manager
//! not ready instead of failing later at call time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

fn default_connect_timeout_secs() -> Option<u64> {
    Some(30)
}

/// Settings the session manager needs from its host.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Default assistant identifier, used when a start request names none.
    #[serde(default)]
    pub assistant_id: String,
    #[serde(default, skip_serializing)]
    pub public_key: String,
    /// Seconds to wait for `call-start` before giving up on a connection
    /// attempt. `None` waits forever. Default: 30.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: Option<u64>,
    /// Enables the debug tap and diagnostic endpoints.
    #[serde(default)]
    pub debug: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            assistant_id: String::new(),
            public_key: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            debug: false,
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("assistant_id", &self.assistant_id)
            .field("public_key", &"[REDACTED]")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("debug", &self.debug)
            .finish()
    }
}

impl SessionSettings {
    pub fn new(assistant_id: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            public_key: public_key.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Validates the identifiers. Missing or placeholder values make the
    /// session not ready; malformed ones only log a warning.
    pub fn readiness(&self) -> Readiness {
        let checks = [
            ("assistant_id", &self.assistant_id),
            ("public_key", &self.public_key),
        ];
        for (field, value) in checks {
            match validate_identifier(value) {
                IdentifierCheck::Missing => {
                    return Readiness::NotReady(format!("{field} is not configured"));
                }
                IdentifierCheck::Placeholder => {
                    return Readiness::NotReady(format!("{field} still holds a placeholder value"));
                }
                IdentifierCheck::Malformed => {
                    tracing::warn!(field, "identifier is not in UUID format; continuing anyway");
                }
                IdentifierCheck::Valid => {}
            }
        }
        Readiness::Ready
    }
}

/// Whether the session can start calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Readiness::Ready => None,
            Readiness::NotReady(reason) => Some(reason),
        }
    }
}

/// Classification of a configured identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCheck {
    Missing,
    Placeholder,
    Malformed,
    Valid,
}

const PLACEHOLDER_MARKERS: &[&str] = &["your", "placeholder", "changeme", "replace", "example"];

/// Classifies an assistant id or public key.
pub fn validate_identifier(value: &str) -> IdentifierCheck {
    let value = value.trim();
    if value.is_empty() {
        return IdentifierCheck::Missing;
    }

    let lower = value.to_ascii_lowercase();
    let templated = value.starts_with('<') && value.ends_with('>');
    let masked = lower.len() >= 3 && lower.chars().all(|c| c == 'x' || c == '-' || c == '*');
    if templated || masked || PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
        return IdentifierCheck::Placeholder;
    }

    match Uuid::parse_str(value) {
        Ok(_) => IdentifierCheck::Valid,
        Err(_) => IdentifierCheck::Malformed,
    }
}
