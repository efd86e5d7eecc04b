//! Choice-driven story sessions narrated by an AI model.
//!
//! This crate provides:
//! - An append-only transcript of narration and player choices
//! - A narrator that asks Claude for the next segment and degrades to
//!   offline content when the provider misbehaves
//! - A session state machine with save/resume
//! - A worker task that owns a session behind a channel
//!
//! # Quick Start
//!
//! ```ignore
//! use storyloop_core::StoryConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoryConfig::from_env()?;
//!     let mut session = config.open_session().await?;
//!
//!     session.begin().await?;
//!     println!("{}", session.export());
//!
//!     if let Some(choice) = session.choices().first().cloned() {
//!         session.pick(&choice).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod fallback;
pub mod narrator;
pub mod persist;
pub mod provider;
pub mod segment;
pub mod session;
pub mod testing;
pub mod transcript;
pub mod worker;

// Primary public API
pub use config::{ConfigError, StoryConfig};
pub use fallback::FallbackGenerator;
pub use narrator::{FailureKind, GenerationError, Narrator, NarratorConfig};
pub use persist::{FileStorage, LoadOutcome, MemoryStorage, SavedSession, SessionStore, Storage};
pub use provider::{CompletionError, CompletionRequest, TextCompletion};
pub use segment::{StorySegment, INSULT_CHOICE, RESTART_CHOICE};
pub use session::{Phase, SessionError, SessionView, StorySession};
pub use testing::{MockCompletion, TestHarness};
pub use transcript::{EntryKind, LogEntry, SessionStats, Transcript};
pub use worker::{spawn_session, SessionHandle, WorkerRequest, WorkerResponse};
