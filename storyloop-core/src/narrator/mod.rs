//! The AI narrator: turns a transcript into the next story segment.
//!
//! The [`Narrator`] builds a prompt from the whole transcript, asks a
//! [`TextCompletion`] backend for schema-shaped JSON, validates the answer
//! and classifies anything that goes wrong. Malformed output, rate limits
//! and an unreachable provider are absorbed into substitute segments;
//! a rejected credential or an unexpected failure is returned as a
//! [`GenerationError`].

pub mod classify;
pub mod prompt;

pub use classify::FailureKind;

use crate::fallback::FallbackGenerator;
use crate::provider::{CompletionError, CompletionRequest, TextCompletion};
use crate::segment::StorySegment;
use crate::transcript::Transcript;
use thiserror::Error;
use tracing::{debug, warn};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.95;

/// Default token budget for one segment.
pub const DEFAULT_MAX_TOKENS: usize = 1024;

/// A failure that stops the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("{}", classify::fatal_message(FailureKind::CredentialInvalid))]
    CredentialInvalid { detail: String },

    #[error("{}", classify::fatal_message(FailureKind::Unknown))]
    Unknown { detail: String },
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::CredentialInvalid { .. } => FailureKind::CredentialInvalid,
            GenerationError::Unknown { .. } => FailureKind::Unknown,
        }
    }

    /// The underlying provider error text.
    pub fn detail(&self) -> &str {
        match self {
            GenerationError::CredentialInvalid { detail } | GenerationError::Unknown { detail } => {
                detail
            }
        }
    }
}

/// Fixed generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NarratorConfig {
    /// Model override; the backend default is used when unset.
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Extra instructions appended to the directive.
    pub custom_directive: Option<String>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            custom_directive: None,
        }
    }
}

/// Produces story segments, online or offline.
pub struct Narrator {
    backend: Option<Box<dyn TextCompletion>>,
    fallback: FallbackGenerator,
    config: NarratorConfig,
}

impl Narrator {
    /// A narrator backed by a remote model.
    pub fn new(backend: impl TextCompletion + 'static) -> Self {
        Self {
            backend: Some(Box::new(backend)),
            fallback: FallbackGenerator::new(),
            config: NarratorConfig::default(),
        }
    }

    /// A narrator that never touches the network.
    pub fn offline() -> Self {
        Self {
            backend: None,
            fallback: FallbackGenerator::new(),
            config: NarratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NarratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.config
    }

    pub fn is_offline(&self) -> bool {
        self.backend.is_none()
    }

    /// The request that would be sent for `transcript`.
    pub fn build_request(&self, transcript: &Transcript) -> CompletionRequest {
        CompletionRequest {
            directive: prompt::build_directive(self.config.custom_directive.as_deref()),
            prompt: prompt::build_prompt(transcript),
            schema: prompt::segment_schema(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            model: self.config.model.clone(),
        }
    }

    /// Generate the segment that follows `transcript`.
    ///
    /// A successful segment always has at least one choice.
    pub async fn generate_next(
        &mut self,
        transcript: &Transcript,
    ) -> Result<StorySegment, GenerationError> {
        let Some(backend) = &self.backend else {
            debug!("No provider configured, generating offline");
            return Ok(self.fallback.generate(transcript));
        };

        let request = self.build_request(transcript);
        let result = match backend.complete_text(request).await {
            Ok(raw) => prompt::parse_segment(&raw).map_err(CompletionError::Malformed),
            Err(error) => Err(error),
        };

        match result {
            Ok(segment) => Ok(segment),
            Err(error) => self.recover(error, transcript),
        }
    }

    fn recover(
        &mut self,
        error: CompletionError,
        transcript: &Transcript,
    ) -> Result<StorySegment, GenerationError> {
        let kind = classify::classify(&error);
        warn!(?kind, error = %error, "Story generation failed");

        if !kind.is_recoverable() {
            let detail = error.to_string();
            return Err(match kind {
                FailureKind::CredentialInvalid => GenerationError::CredentialInvalid { detail },
                _ => GenerationError::Unknown { detail },
            });
        }

        let segment = match kind {
            FailureKind::MalformedOutput => classify::malformed_segment(),
            FailureKind::RateLimited => classify::rate_limited_segment(),
            _ => {
                let stand_in = self.fallback.generate(transcript);
                classify::offline_segment(&stand_in.narration)
            }
        };
        Ok(segment)
    }
}
