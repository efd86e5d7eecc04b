//! Session configuration.
//!
//! [`StoryConfig`] gathers everything needed to assemble a session: the
//! provider credential and generation settings, the transport policy, where
//! saves live and how the offline generator is seeded.

use crate::fallback::FallbackGenerator;
use crate::narrator::{Narrator, NarratorConfig, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::persist::{FileStorage, SessionStore};
use crate::session::StorySession;
use claude::{Claude, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default directory for the saved session.
pub const DEFAULT_SAVE_DIR: &str = "saves";

/// Errors while building configuration or the provider client.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to create provider client: {0}")]
    Client(#[from] claude::Error),
}

/// Configuration for a story session.
#[derive(Debug, Clone)]
pub struct StoryConfig {
    /// Provider credential; `None` means offline play.
    pub api_key: Option<String>,

    /// Model override.
    pub model: Option<String>,

    pub max_tokens: usize,

    pub temperature: f32,

    /// Extra instructions appended to the narrator directive.
    pub custom_directive: Option<String>,

    /// Per-request timeout enforced by the transport.
    pub request_timeout: Duration,

    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,

    /// Directory holding the saved session.
    pub save_dir: PathBuf,

    /// Seed for the offline generator; random when unset.
    pub seed: Option<u64>,

    /// Never contact the provider, even with a credential.
    pub offline: bool,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            custom_directive: None,
            request_timeout: claude::DEFAULT_TIMEOUT,
            max_retries: RetryPolicy::default().max_retries,
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
            seed: None,
            offline: false,
        }
    }
}

impl StoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the process environment.
    ///
    /// Recognised variables: `ANTHROPIC_API_KEY`, `STORYLOOP_MODEL`,
    /// `STORYLOOP_SAVE_DIR`, `STORYLOOP_TEMPERATURE` and `STORYLOOP_OFFLINE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        config.api_key = var("ANTHROPIC_API_KEY");
        config.model = var("STORYLOOP_MODEL");
        if let Some(dir) = var("STORYLOOP_SAVE_DIR") {
            config.save_dir = PathBuf::from(dir);
        }
        if let Some(raw) = var("STORYLOOP_TEMPERATURE") {
            config.temperature = parse_temperature(&raw)?;
        }
        if let Some(raw) = var("STORYLOOP_OFFLINE") {
            config.offline = parse_flag("STORYLOOP_OFFLINE", &raw)?;
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.custom_directive = Some(directive.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Whether a narrator built from this config skips the network.
    pub fn is_offline(&self) -> bool {
        self.offline || self.api_key.is_none()
    }

    fn narrator_config(&self) -> NarratorConfig {
        NarratorConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            custom_directive: self.custom_directive.clone(),
        }
    }

    fn fallback(&self) -> FallbackGenerator {
        match self.seed {
            Some(seed) => FallbackGenerator::seeded(seed),
            None => FallbackGenerator::new(),
        }
    }

    /// Build the narrator: backed by Claude when a credential is present,
    /// offline otherwise.
    pub fn build_narrator(&self) -> Result<Narrator, ConfigError> {
        let narrator = match (&self.api_key, self.offline) {
            (Some(key), false) => {
                let mut client = Claude::new(key.as_str())?
                    .with_timeout(self.request_timeout)
                    .with_retry_policy(RetryPolicy {
                        max_retries: self.max_retries,
                        ..RetryPolicy::default()
                    });
                if let Some(model) = &self.model {
                    client = client.with_model(model.as_str());
                }
                info!(model = client.model(), "Using Claude narrator");
                Narrator::new(client)
            }
            _ => {
                info!("No provider configured, playing offline");
                Narrator::offline()
            }
        };

        Ok(narrator
            .with_config(self.narrator_config())
            .with_fallback(self.fallback()))
    }

    /// Build the store for the saved session under `save_dir`.
    pub fn build_store(&self) -> SessionStore {
        SessionStore::new(FileStorage::new(&self.save_dir))
    }

    /// Assemble a session and read any saved snapshot.
    pub async fn open_session(&self) -> Result<StorySession, ConfigError> {
        let narrator = self.build_narrator()?;
        Ok(StorySession::open(narrator, self.build_store()).await)
    }
}

fn parse_temperature(raw: &str) -> Result<f32, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        name: "STORYLOOP_TEMPERATURE",
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let value: f32 = raw.trim().parse().map_err(|_| invalid("not a number"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid("must be between 0 and 1"));
    }
    Ok(value)
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
