//! Testing utilities for story sessions.
//!
//! This module provides tools for integration testing:
//! - `MockCompletion` for deterministic provider replies without API calls
//! - `TestHarness` for scripted session scenarios
//! - Assertion helpers for verifying transcript and phase

use crate::fallback::FallbackGenerator;
use crate::narrator::Narrator;
use crate::persist::{MemoryStorage, SessionStore};
use crate::provider::{CompletionError, CompletionRequest, TextCompletion};
use crate::session::{Phase, StorySession};
use crate::transcript::{EntryKind, Transcript};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Reply used once the script runs dry.
const DEFAULT_REPLY: &str =
    r#"{"narration": "The narrator has nothing scripted left to say.", "choices": ["Go on"]}"#;

#[derive(Default)]
struct MockState {
    replies: VecDeque<Result<String, CompletionError>>,
    requests: Vec<CompletionRequest>,
}

/// A provider that returns scripted replies in order.
///
/// Clones share the same script and request log, so a test can keep one
/// handle while the narrator owns another.
#[derive(Clone, Default)]
pub struct MockCompletion {
    state: Arc<Mutex<MockState>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a well-formed segment.
    pub fn push_segment(&self, narration: &str, choices: &[&str]) {
        let raw = serde_json::json!({ "narration": narration, "choices": choices }).to_string();
        self.push_raw(raw);
    }

    /// Queue raw provider text, valid or not.
    pub fn push_raw(&self, raw: impl Into<String>) {
        self.state().replies.push_back(Ok(raw.into()));
    }

    /// Queue a provider failure.
    pub fn push_error(&self, error: CompletionError) {
        self.state().replies.push_back(Err(error));
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state().requests.clone()
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.state().replies.len()
    }
}

#[async_trait]
impl TextCompletion for MockCompletion {
    async fn complete_text(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut state = self.state();
        state.requests.push(request);
        state
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_REPLY.to_string()))
    }
}

/// A session over a scripted provider and in-memory storage.
pub struct TestHarness {
    pub session: StorySession,
    pub provider: MockCompletion,
    pub storage: MemoryStorage,
}

impl TestHarness {
    /// Create a harness with an online (mock) narrator.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    /// Create a harness over existing storage, e.g. to simulate a restart.
    pub fn with_storage(storage: MemoryStorage) -> Self {
        let provider = MockCompletion::new();
        let narrator = Narrator::new(provider.clone()).with_fallback(FallbackGenerator::seeded(0));
        let session = StorySession::new(narrator, SessionStore::new(storage.clone()));
        Self {
            session,
            provider,
            storage,
        }
    }

    /// Create a harness whose narrator has no provider at all.
    pub fn offline(seed: u64) -> Self {
        let storage = MemoryStorage::new();
        let narrator = Narrator::offline().with_fallback(FallbackGenerator::seeded(seed));
        Self {
            session: StorySession::new(narrator, SessionStore::new(storage.clone())),
            provider: MockCompletion::new(),
            storage,
        }
    }

    /// Queue a well-formed segment.
    pub fn expect_segment(&mut self, narration: &str, choices: &[&str]) -> &mut Self {
        self.provider.push_segment(narration, choices);
        self
    }

    /// Queue a provider failure.
    pub fn expect_error(&mut self, error: CompletionError) -> &mut Self {
        self.provider.push_error(error);
        self
    }

    /// Queue raw provider text.
    pub fn expect_raw(&mut self, raw: &str) -> &mut Self {
        self.provider.push_raw(raw);
        self
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn choices(&self) -> &[String] {
        self.session.choices()
    }

    pub fn transcript(&self) -> &Transcript {
        self.session.transcript()
    }

    /// Text of the most recent narration entry.
    pub fn last_narration(&self) -> Option<&str> {
        self.session
            .transcript()
            .entries()
            .iter()
            .rev()
            .find(|e| e.kind == EntryKind::Narration)
            .map(|e| e.text.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the transcript opens with narration and never has two choices in a row.
#[track_caller]
pub fn assert_alternating(transcript: &Transcript) {
    let entries = transcript.entries();
    if let Some(first) = entries.first() {
        assert_eq!(
            first.kind,
            EntryKind::Narration,
            "Expected the transcript to open with narration"
        );
    }
    for pair in entries.windows(2) {
        if pair[1].kind == EntryKind::Choice {
            assert_eq!(
                pair[0].kind,
                EntryKind::Narration,
                "Expected choice {:?} to follow narration",
                pair[1].text
            );
        }
    }
}

/// Assert the session is in the expected phase.
#[track_caller]
pub fn assert_phase(harness: &TestHarness, expected: Phase) {
    assert_eq!(
        harness.phase(),
        expected,
        "Expected phase {expected}, got {} (last error: {:?})",
        harness.phase(),
        harness.session.last_error()
    );
}
