//! The text-completion seam between the narrator and a remote model.
//!
//! Implementations turn a [`CompletionRequest`] into one raw string that
//! should hold the segment JSON. Whatever shape the provider API answers
//! in stays behind this trait.

use async_trait::async_trait;
use claude::{Claude, Message, Request, Tool, ToolChoice};
use std::time::Duration;
use thiserror::Error;

/// Name of the tool the Claude backend forces to obtain schema-shaped output.
pub const SEGMENT_TOOL: &str = "emit_story_segment";

/// Failures reported by a [`TextCompletion`] backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("credential rejected: {0}")]
    Credential(String),

    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unreadable provider response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

impl From<claude::Error> for CompletionError {
    fn from(error: claude::Error) -> Self {
        match error {
            claude::Error::NoApiKey => CompletionError::Credential("API key not configured".into()),
            claude::Error::Config(message) => CompletionError::Other(message),
            claude::Error::Network(message) => CompletionError::Transport(message),
            claude::Error::Timeout(after) => CompletionError::Timeout(after),
            claude::Error::Api { status, message } => CompletionError::Status { status, message },
            claude::Error::Parse(message) => CompletionError::Malformed(message),
        }
    }
}

/// Everything needed to ask a model for the next segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Persona and output-format directive.
    pub directive: String,
    /// Rendered transcript plus the instruction for this turn.
    pub prompt: String,
    /// JSON Schema the answer must satisfy.
    pub schema: serde_json::Value,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Overrides the backend's default model.
    pub model: Option<String>,
}

/// A backend that completes a prompt into raw text.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete_text(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[async_trait]
impl TextCompletion for Claude {
    async fn complete_text(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let tool = Tool {
            name: SEGMENT_TOOL.to_string(),
            description: "Record the next story segment and the choices offered to the player."
                .to_string(),
            input_schema: request.schema,
        };

        let mut api_request = Request::new(vec![Message::user(request.prompt)])
            .with_system(request.directive)
            .with_max_tokens(request.max_tokens)
            .with_temperature(request.temperature)
            .with_tools(vec![tool])
            .with_tool_choice(ToolChoice::tool(SEGMENT_TOOL));

        if let Some(model) = request.model {
            api_request = api_request.with_model(model);
        }

        let response = self.complete(api_request).await?;

        // Forced tool input is the normal path; plain text shows up when a
        // model ignores the tool and answers with (possibly fenced) JSON.
        Ok(match response.tool_input(SEGMENT_TOOL) {
            Some(input) => input.to_string(),
            None => response.text(),
        })
    }
}
