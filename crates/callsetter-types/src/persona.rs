//! Assistant persona definitions.
//!
//! A persona is a named assistant configuration offered to visitors. Every
//! persona runs through the same session manager; the only thing that
//! differs between them is which assistant identifier is passed when the
//! call starts.

use serde::{Deserialize, Serialize};

/// A selectable assistant persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier used in requests (e.g. `grace`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Voice service assistant (or squad) identifier to call.
    pub assistant_id: String,
    /// Short description shown next to the call button.
    #[serde(default)]
    pub description: String,
}

impl Persona {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            assistant_id: assistant_id.into(),
            description: String::new(),
        }
    }
}
