//! Generated story segments and the reserved choice labels.

use serde::{Deserialize, Serialize};

/// Choice that throws the current story away and starts a new one.
pub const RESTART_CHOICE: &str = "Start over";

/// Choice that insults the narrator. The session treats it like any other
/// pick; only prompt text and fallback narration react to it.
pub const INSULT_CHOICE: &str = "Insult the narrator";

/// One unit of generated output: narration plus the choices offered next.
///
/// Segments handed to the session always carry at least one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySegment {
    pub narration: String,
    pub choices: Vec<String>,
}

impl StorySegment {
    pub fn new(narration: impl Into<String>, choices: Vec<String>) -> Self {
        Self {
            narration: narration.into(),
            choices,
        }
    }

    /// A segment whose only way forward is to start over.
    pub fn restart_only(narration: impl Into<String>) -> Self {
        Self::new(narration, vec![RESTART_CHOICE.to_string()])
    }

    /// Replace an empty choice list with the restart choice.
    pub(crate) fn ensure_choices(mut self) -> Self {
        if self.choices.is_empty() {
            self.choices.push(RESTART_CHOICE.to_string());
        }
        self
    }
}
