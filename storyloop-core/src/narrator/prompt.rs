//! Prompt construction and response parsing for the narrator.

use crate::segment::{StorySegment, INSULT_CHOICE};
use crate::transcript::Transcript;
use serde::Deserialize;
use serde_json::json;

/// Instruction appended after a non-empty transcript.
pub const NEXT_SEGMENT_INSTRUCTION: &str = "Write the next fragment.";

/// Instruction used when the transcript is empty.
pub const OPENING_INSTRUCTION: &str = "Begin a new story.";

/// Fixed persona and output-format directive.
pub fn base_directive() -> &'static str {
    include_str!("prompts/directive.txt")
}

/// The full directive, with any custom instructions appended.
pub fn build_directive(custom: Option<&str>) -> String {
    let mut directive = base_directive().trim_end().to_string();
    if let Some(custom) = custom {
        directive.push_str("\n\n## Additional Instructions\n");
        directive.push_str(custom);
    }
    directive
}

/// Render the whole transcript followed by this turn's instruction.
///
/// Entries are never dropped or summarized.
pub fn build_prompt(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return OPENING_INSTRUCTION.to_string();
    }

    let mut prompt = transcript.export();
    prompt.push_str("\n\n");
    if transcript.pending_choice() == Some(INSULT_CHOICE) {
        prompt.push_str(include_str!("prompts/insult.txt").trim_end());
        prompt.push('\n');
    }
    prompt.push_str(NEXT_SEGMENT_INSTRUCTION);
    prompt
}

/// JSON Schema for one segment: narration plus (ideally three) choices.
pub fn segment_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "narration": {
                "type": "string",
                "description": "Two or three sentences continuing the story."
            },
            "choices": {
                "type": "array",
                "description": "Three short options for the player.",
                "items": { "type": "string" },
                "minItems": 3,
                "maxItems": 3
            }
        },
        "required": ["narration", "choices"]
    })
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    #[serde(default, alias = "story")]
    narration: Option<String>,
    #[serde(default)]
    choices: Option<Vec<String>>,
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("json") together with the opening fence line.
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse a raw provider answer into a segment.
///
/// Rejects missing or blank narration and a missing or non-array `choices`.
/// An empty `choices` array becomes the single restart choice.
pub fn parse_segment(raw: &str) -> Result<StorySegment, String> {
    let wire: WireSegment = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| format!("invalid segment JSON: {e}"))?;

    let narration = wire
        .narration
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| "segment JSON has no narration".to_string())?;
    let choices = wire
        .choices
        .ok_or_else(|| "segment JSON has no choices array".to_string())?;

    Ok(StorySegment::new(narration, choices).ensure_choices())
}
