//! External SDK event names mapped onto the internal vocabulary.
//!
//! SDK versions disagree on spelling (`call-start` vs `callStarted`), so the
//! adapter subscribes to every alias listed here. Supporting a new alias is
//! a one-line addition to [`EVENT_ALIASES`].

use crate::event::EventKind;

/// `(external name, internal kind)` pairs.
pub const EVENT_ALIASES: &[(&str, EventKind)] = &[
    ("call-start", EventKind::CallStart),
    ("callStarted", EventKind::CallStart),
    ("call-end", EventKind::CallEnd),
    ("callEnded", EventKind::CallEnd),
    ("speech-start", EventKind::SpeechStart),
    ("speech-end", EventKind::SpeechEnd),
    ("message", EventKind::Message),
    ("volume-level", EventKind::VolumeLevel),
    ("error", EventKind::Error),
];

/// Looks up the internal kind for an external event name.
pub fn internal_kind(external: &str) -> Option<EventKind> {
    EVENT_ALIASES
        .iter()
        .find(|(name, _)| *name == external)
        .map(|(_, kind)| *kind)
}

/// Every external name the adapter subscribes to.
pub fn external_names() -> impl Iterator<Item = &'static str> {
    EVENT_ALIASES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_lifecycle_spellings_normalise() {
        assert_eq!(internal_kind("call-start"), Some(EventKind::CallStart));
        assert_eq!(internal_kind("callStarted"), Some(EventKind::CallStart));
        assert_eq!(internal_kind("call-end"), Some(EventKind::CallEnd));
        assert_eq!(internal_kind("callEnded"), Some(EventKind::CallEnd));
    }

    #[test]
    fn derived_and_unknown_names_are_not_external() {
        assert_eq!(internal_kind("assistant-message"), None);
        assert_eq!(internal_kind("call-state-changed"), None);
        assert_eq!(internal_kind("CALL-START"), None);
    }

    #[test]
    fn external_names_are_unique() {
        let mut names: Vec<_> = external_names().collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
