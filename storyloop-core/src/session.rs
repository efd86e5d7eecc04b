//! StorySession - the session state machine.
//!
//! The session owns the transcript and the offered choices, drives the
//! [`Narrator`] on every user action and persists each successful
//! transition. Only one generation can be in flight: choices are cleared
//! the moment a call starts and only repopulated when it settles.

use crate::narrator::Narrator;
use crate::persist::{SavedSession, SessionStore};
use crate::segment::RESTART_CHOICE;
use crate::transcript::{EntryKind, LogEntry, SessionStats, Transcript};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// The phase the session is in. Process state only, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Nothing generated yet (or a resumed snapshot without choices).
    #[default]
    Start,
    /// A generation call is in flight.
    Working,
    /// Choices are on offer.
    Ready,
    /// A fatal failure stopped the session.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Working => "working",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Inputs the session refuses in its current phase.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot {action} while the session is {phase}")]
    InvalidTransition { action: &'static str, phase: Phase },

    #[error("Choice text is empty")]
    EmptyChoice,
}

/// Read-only snapshot of everything the presentation layer shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub phase: Phase,
    pub transcript: Vec<LogEntry>,
    pub choices: Vec<String>,
    /// User-facing message, set only in [`Phase::Failed`].
    pub last_error: Option<String>,
    pub stats: SessionStats,
    pub has_saved_session: bool,
}

/// A single narrative session.
pub struct StorySession {
    narrator: Narrator,
    store: SessionStore,
    transcript: Transcript,
    choices: Vec<String>,
    phase: Phase,
    last_error: Option<String>,
    /// Snapshot found at startup or by the last resume.
    saved: Option<SavedSession>,
    has_saved: bool,
    view_tx: watch::Sender<SessionView>,
}

impl StorySession {
    /// Create a session in [`Phase::Start`] without touching storage.
    pub fn new(narrator: Narrator, store: SessionStore) -> Self {
        let (view_tx, _) = watch::channel(SessionView::default());
        Self {
            narrator,
            store,
            transcript: Transcript::new(),
            choices: Vec::new(),
            phase: Phase::Start,
            last_error: None,
            saved: None,
            has_saved: false,
            view_tx,
        }
    }

    /// Create a session and read the saved snapshot once, for the resume
    /// affordance. The live transcript stays empty until [`resume`](Self::resume).
    pub async fn open(narrator: Narrator, store: SessionStore) -> Self {
        let mut session = Self::new(narrator, store);
        session.saved = session.store.load().await;
        session.has_saved = session.saved.is_some();
        if let Some(saved) = &session.saved {
            info!(
                entries = saved.transcript.len(),
                saved_at = %saved.saved_at,
                "Found saved session"
            );
        }
        session.publish();
        session
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Start a fresh story. Allowed from `Start` and `Failed`.
    pub async fn begin(&mut self) -> Result<(), SessionError> {
        self.require(&[Phase::Start, Phase::Failed], "begin")?;
        self.start_fresh().await;
        Ok(())
    }

    /// Retry after a fatal failure; behaves exactly like [`begin`](Self::begin).
    pub async fn retry(&mut self) -> Result<(), SessionError> {
        self.require(&[Phase::Failed], "retry")?;
        self.start_fresh().await;
        Ok(())
    }

    /// Pick a continuation.
    ///
    /// Any non-empty text is accepted, not only the offered choices. The
    /// restart choice clears the transcript instead of being appended.
    ///
    /// The `Ready` view is published as soon as the segment arrives; the
    /// call itself returns after the best-effort save has been attempted,
    /// so a snapshot taken afterwards is already on storage. Save failures
    /// are logged and never change the phase.
    pub async fn pick(&mut self, choice: &str) -> Result<(), SessionError> {
        self.require(&[Phase::Ready], "pick")?;
        let choice = choice.trim();
        if choice.is_empty() {
            return Err(SessionError::EmptyChoice);
        }

        if choice == RESTART_CHOICE {
            info!("Restarting story");
            self.start_fresh().await;
        } else {
            debug!(choice, "Player picked");
            self.transcript.append(EntryKind::Choice, choice);
            self.generate().await;
        }
        Ok(())
    }

    /// Replace the live session with the saved snapshot, skipping generation.
    ///
    /// Returns `false` (and changes nothing) when there is nothing to resume.
    pub async fn resume(&mut self) -> Result<bool, SessionError> {
        self.require(&[Phase::Start, Phase::Ready, Phase::Failed], "resume")?;

        let Some(saved) = self.store.load().await else {
            self.saved = None;
            self.has_saved = false;
            self.publish();
            return Ok(false);
        };

        self.transcript = Transcript::from_entries(saved.transcript.clone());
        self.choices = saved.choices.clone();
        self.last_error = None;
        self.saved = Some(saved);
        self.has_saved = true;

        let next = if self.choices.is_empty() {
            Phase::Start
        } else {
            Phase::Ready
        };
        info!(entries = self.transcript.len(), phase = %next, "Resumed saved session");
        self.set_phase(next);
        Ok(true)
    }

    /// Delete the saved snapshot. The live session is untouched.
    pub async fn clear_saved(&mut self) {
        self.store.clear().await;
        self.saved = None;
        self.has_saved = false;
        self.publish();
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn require(&self, allowed: &[Phase], action: &'static str) -> Result<(), SessionError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    async fn start_fresh(&mut self) {
        self.transcript.clear();
        self.generate().await;
    }

    async fn generate(&mut self) {
        self.choices.clear();
        self.last_error = None;
        self.set_phase(Phase::Working);

        match self.narrator.generate_next(&self.transcript).await {
            Ok(segment) => {
                self.transcript
                    .append(EntryKind::Narration, segment.narration);
                self.choices = segment.choices;
                self.set_phase(Phase::Ready);

                // The Ready view is already out; the save only moves the flag.
                if self.store.save(&self.transcript, &self.choices).await {
                    self.has_saved = true;
                    self.publish();
                }
            }
            Err(e) => {
                error!(kind = ?e.kind(), detail = e.detail(), "Story generation stopped");
                self.last_error = Some(e.to_string());
                self.set_phase(Phase::Failed);
            }
        }
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            debug!(from = %self.phase, to = %next, "Phase transition");
        }
        self.phase = next;
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Offered choices; empty unless the session is `Ready`.
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        self.transcript.stats()
    }

    /// The transcript as `"<role>: <text>"` lines.
    pub fn export(&self) -> String {
        self.transcript.export()
    }

    /// The snapshot found at startup or by the last resume.
    pub fn saved_preview(&self) -> Option<&SavedSession> {
        self.saved.as_ref()
    }

    pub fn has_saved_session(&self) -> bool {
        self.has_saved
    }

    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            transcript: self.transcript.snapshot(),
            choices: self.choices.clone(),
            last_error: self.last_error.clone(),
            stats: self.transcript.stats(),
            has_saved_session: self.has_saved,
        }
    }

    /// Observe every published view, including `Working`.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }
}
