//! Normalised session event vocabulary.

use callsetter_types::{CallState, TranscriptMessage};
use serde::Serialize;

/// Internal event names subscribers can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    CallStart,
    CallEnd,
    SpeechStart,
    SpeechEnd,
    Message,
    /// Derived from `Message` for assistant transcripts.
    AssistantMessage,
    VolumeLevel,
    Error,
    /// Carries the full `CallState` after every lifecycle transition.
    CallStateChanged,
    CallDurationUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        Self::CallStart,
        Self::CallEnd,
        Self::SpeechStart,
        Self::SpeechEnd,
        Self::Message,
        Self::AssistantMessage,
        Self::VolumeLevel,
        Self::Error,
        Self::CallStateChanged,
        Self::CallDurationUpdated,
    ];

    /// Returns the canonical event name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallStart => "call-start",
            Self::CallEnd => "call-end",
            Self::SpeechStart => "speech-start",
            Self::SpeechEnd => "speech-end",
            Self::Message => "message",
            Self::AssistantMessage => "assistant-message",
            Self::VolumeLevel => "volume-level",
            Self::Error => "error",
            Self::CallStateChanged => "call-state-changed",
            Self::CallDurationUpdated => "call-duration-updated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventKindError(s.to_string()))
    }
}

/// Error returned when parsing an unknown event name.
#[derive(Debug, Clone)]
pub struct ParseEventKindError(pub String);

impl std::fmt::Display for ParseEventKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown session event: {}", self.0)
    }
}

impl std::error::Error for ParseEventKindError {}

/// A normalised event with its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SessionEvent {
    CallStart,
    CallEnd,
    SpeechStart,
    SpeechEnd,
    Message(TranscriptMessage),
    AssistantMessage(TranscriptMessage),
    VolumeLevel(f32),
    Error(String),
    CallStateChanged(CallState),
    CallDurationUpdated(u64),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CallStart => EventKind::CallStart,
            Self::CallEnd => EventKind::CallEnd,
            Self::SpeechStart => EventKind::SpeechStart,
            Self::SpeechEnd => EventKind::SpeechEnd,
            Self::Message(_) => EventKind::Message,
            Self::AssistantMessage(_) => EventKind::AssistantMessage,
            Self::VolumeLevel(_) => EventKind::VolumeLevel,
            Self::Error(_) => EventKind::Error,
            Self::CallStateChanged(_) => EventKind::CallStateChanged,
            Self::CallDurationUpdated(_) => EventKind::CallDurationUpdated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("callStarted".parse::<EventKind>().is_err());
    }

    #[test]
    fn serialised_event_name_matches_kind() {
        let events = [
            SessionEvent::CallStart,
            SessionEvent::VolumeLevel(0.5),
            SessionEvent::CallStateChanged(CallState::default()),
            SessionEvent::CallDurationUpdated(3),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.kind().as_str());
        }
    }
}
