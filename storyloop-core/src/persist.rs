//! Session persistence for save/resume.
//!
//! A single saved session lives under one storage key as JSON text. Loading
//! re-validates the stored document before trusting it: anything that is
//! not a well-formed snapshot of the current version is purged and treated
//! as absent. Failures here are logged and never reach the caller.

use crate::transcript::{LogEntry, Transcript};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Storage key holding the saved session.
pub const SESSION_KEY: &str = "storyloop-session";

/// Current save format version.
const SAVE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid entry id {id} at position {position}")]
    InvalidEntryId { id: u64, position: usize },
}

/// A saved session with all state needed to resume play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSession {
    /// Save format version for compatibility checking.
    pub version: u32,

    pub transcript: Vec<LogEntry>,

    pub choices: Vec<String>,

    pub saved_at: DateTime<Utc>,
}

impl SavedSession {
    /// Capture a detached copy of the live session.
    pub fn capture(transcript: &Transcript, choices: &[String]) -> Self {
        Self {
            version: SAVE_VERSION,
            transcript: transcript.snapshot(),
            choices: choices.to_vec(),
            saved_at: Utc::now(),
        }
    }

    /// A snapshot with no entries and no choices holds nothing to resume.
    pub fn is_meaningful(&self) -> bool {
        !(self.transcript.is_empty() && self.choices.is_empty())
    }
}

/// What was found under the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Valid(SavedSession),
    Absent,
    Corrupt(String),
}

impl LoadOutcome {
    /// Validate raw stored text.
    pub fn decode(raw: &str) -> Self {
        match parse_saved(raw) {
            Ok(saved) if saved.is_meaningful() => LoadOutcome::Valid(saved),
            Ok(_) => LoadOutcome::Absent,
            Err(e) => LoadOutcome::Corrupt(e.to_string()),
        }
    }
}

fn parse_saved(raw: &str) -> Result<SavedSession, PersistError> {
    #[derive(Deserialize)]
    struct Version {
        version: u32,
    }

    // Check the version first so a future format reports a mismatch rather
    // than whichever field happened to change.
    let Version { version } = serde_json::from_str(raw)?;
    if version != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found: version,
        });
    }
    let saved: SavedSession = serde_json::from_str(raw)?;
    check_entry_ids(&saved.transcript)?;
    Ok(saved)
}

/// Ids must be strictly increasing and leave room for the next append.
fn check_entry_ids(entries: &[LogEntry]) -> Result<(), PersistError> {
    let mut previous: Option<u64> = None;
    for (position, entry) in entries.iter().enumerate() {
        let in_order = previous.map_or(true, |prev| entry.id > prev);
        if !in_order || entry.id == u64::MAX {
            return Err(PersistError::InvalidEntryId {
                id: entry.id,
                position,
            });
        }
        previous = Some(entry.id);
    }
    Ok(())
}

// ============================================================================
// Storage backends
// ============================================================================

/// Durable key/value text storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a key; a missing key is `Ok(None)`.
    async fn read(&self, key: &str) -> io::Result<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove a key; removing a missing key succeeds.
    async fn remove(&self, key: &str) -> io::Result<()>;
}

/// Stores each key as a JSON file in one directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let sanitized = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-memory storage; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Session store
// ============================================================================

/// Saves, validates and restores the single saved session.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl SessionStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
            key: SESSION_KEY.to_string(),
        }
    }

    /// Use a different storage key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Overwrite the saved session and report whether it was written.
    /// Failures are logged only.
    pub async fn save(&self, transcript: &Transcript, choices: &[String]) -> bool {
        let saved = SavedSession::capture(transcript, choices);
        match self.write(&saved).await {
            Ok(()) => {
                debug!(key = %self.key, entries = saved.transcript.len(), "Session saved");
                true
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to save session");
                false
            }
        }
    }

    async fn write(&self, saved: &SavedSession) -> Result<(), PersistError> {
        let content = serde_json::to_string(saved)?;
        self.storage.write(&self.key, &content).await?;
        Ok(())
    }

    /// Read and classify whatever is stored, without side effects.
    pub async fn inspect(&self) -> LoadOutcome {
        match self.storage.read(&self.key).await {
            Ok(Some(raw)) => LoadOutcome::decode(&raw),
            Ok(None) => LoadOutcome::Absent,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read saved session");
                LoadOutcome::Absent
            }
        }
    }

    /// Load the saved session, purging anything that fails validation.
    pub async fn load(&self) -> Option<SavedSession> {
        match self.inspect().await {
            LoadOutcome::Valid(saved) => Some(saved),
            LoadOutcome::Absent => None,
            LoadOutcome::Corrupt(reason) => {
                info!(key = %self.key, %reason, "Discarding unreadable saved session");
                self.clear().await;
                None
            }
        }
    }

    /// Delete the saved session. Failures are logged only.
    pub async fn clear(&self) {
        if let Err(e) = self.storage.remove(&self.key).await {
            warn!(key = %self.key, error = %e, "Failed to clear saved session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::EntryKind;
    use tempfile::TempDir;

    fn sample() -> (Transcript, Vec<String>) {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "You wake in a ditch.");
        transcript.append(EntryKind::Choice, "Crawl out");
        transcript.append(EntryKind::Narration, "The ditch wins.");
        (transcript, vec!["Cry".to_string(), "Sleep".to_string()])
    }

    #[test]
    fn saved_session_uses_camel_case() {
        let (transcript, choices) = sample();
        let json = serde_json::to_value(SavedSession::capture(&transcript, &choices)).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json.get("savedAt").is_some());
        assert_eq!(json["transcript"][1]["kind"], "choice");
    }

    #[test]
    fn decode_classifies_documents() {
        let (transcript, choices) = sample();
        let valid = serde_json::to_string(&SavedSession::capture(&transcript, &choices)).unwrap();
        assert!(matches!(LoadOutcome::decode(&valid), LoadOutcome::Valid(_)));

        let empty = serde_json::to_string(&SavedSession::capture(&Transcript::new(), &[])).unwrap();
        assert_eq!(LoadOutcome::decode(&empty), LoadOutcome::Absent);

        assert!(matches!(
            LoadOutcome::decode(r#"{"log": "not-an-array"}"#),
            LoadOutcome::Corrupt(_)
        ));
        assert!(matches!(LoadOutcome::decode("]]"), LoadOutcome::Corrupt(_)));
    }

    #[test]
    fn decode_rejects_bad_entries() {
        let bad_kind = r#"{"version":1,"transcript":[{"id":1,"kind":"villain","text":"x"}],"choices":[],"savedAt":"2024-01-01T00:00:00Z"}"#;
        let bad_text = r#"{"version":1,"transcript":[{"id":1,"kind":"narration","text":5}],"choices":[],"savedAt":"2024-01-01T00:00:00Z"}"#;
        let bad_id = r#"{"version":1,"transcript":[{"id":"one","kind":"narration","text":"x"}],"choices":[],"savedAt":"2024-01-01T00:00:00Z"}"#;
        let bad_choices = r#"{"version":1,"transcript":[],"choices":[1],"savedAt":"2024-01-01T00:00:00Z"}"#;

        for raw in [bad_kind, bad_text, bad_id, bad_choices] {
            assert!(matches!(LoadOutcome::decode(raw), LoadOutcome::Corrupt(_)), "{raw}");
        }
    }

    #[test]
    fn decode_rejects_unusable_ids() {
        let doc = |ids: &[u64]| {
            let transcript: Vec<_> = ids
                .iter()
                .map(|id| serde_json::json!({"id": id, "kind": "narration", "text": "x"}))
                .collect();
            serde_json::json!({
                "version": 1,
                "transcript": transcript,
                "choices": ["A"],
                "savedAt": "2024-01-01T00:00:00Z"
            })
            .to_string()
        };

        assert!(matches!(LoadOutcome::decode(&doc(&[0, 4, 9])), LoadOutcome::Valid(_)));
        assert!(matches!(LoadOutcome::decode(&doc(&[u64::MAX])), LoadOutcome::Corrupt(_)));
        assert!(matches!(LoadOutcome::decode(&doc(&[3, 3])), LoadOutcome::Corrupt(_)));
        match LoadOutcome::decode(&doc(&[5, 2])) {
            LoadOutcome::Corrupt(reason) => assert!(reason.contains("position 1")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_reports_failed_writes() {
        struct ReadOnly;

        #[async_trait]
        impl Storage for ReadOnly {
            async fn read(&self, _key: &str) -> io::Result<Option<String>> {
                Ok(None)
            }
            async fn write(&self, _key: &str, _value: &str) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
            }
            async fn remove(&self, _key: &str) -> io::Result<()> {
                Ok(())
            }
        }

        let (transcript, choices) = sample();
        assert!(!SessionStore::new(ReadOnly).save(&transcript, &choices).await);
        assert!(SessionStore::new(MemoryStorage::new()).save(&transcript, &choices).await);
    }

    #[test]
    fn decode_reports_version_mismatch() {
        let future = r#"{"version":2,"entries":[]}"#;
        match LoadOutcome::decode(future) {
            LoadOutcome::Corrupt(reason) => assert!(reason.contains("Version mismatch")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn round_trip_through_memory() {
        let store = SessionStore::new(MemoryStorage::new());
        let (transcript, choices) = sample();

        store.save(&transcript, &choices).await;
        let loaded = store.load().await.expect("saved session should load");

        assert_eq!(loaded.transcript, transcript.snapshot());
        assert_eq!(loaded.choices, choices);
    }

    #[tokio::test]
    async fn load_purges_corrupt_data() {
        let storage = MemoryStorage::new();
        storage.write(SESSION_KEY, r#"{"log": "not-an-array"}"#).await.unwrap();
        let store = SessionStore::new(storage.clone());

        assert!(store.load().await.is_none());
        assert_eq!(storage.read(SESSION_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn inspect_does_not_purge() {
        let storage = MemoryStorage::new();
        storage.write(SESSION_KEY, "garbage").await.unwrap();
        let store = SessionStore::new(storage.clone());

        assert!(matches!(store.inspect().await, LoadOutcome::Corrupt(_)));
        assert!(storage.read(SESSION_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_storage_round_trip_and_clear() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = FileStorage::new(temp_dir.path().join("saves"));
        let store = SessionStore::new(storage.clone());
        let (transcript, choices) = sample();

        assert!(store.load().await.is_none());
        store.save(&transcript, &choices).await;
        assert!(storage.path_for(SESSION_KEY).exists());

        let loaded = store.load().await.expect("saved session should load");
        assert_eq!(loaded.transcript.len(), 3);

        store.clear().await;
        assert!(!storage.path_for(SESSION_KEY).exists());
        store.clear().await;
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let storage = FileStorage::new("/saves");
        let path = storage.path_for("my session/../x");
        assert!(path.to_string_lossy().ends_with("my_session____x.json"));
    }

    #[tokio::test]
    async fn custom_key_is_isolated() {
        let storage = MemoryStorage::new();
        let a = SessionStore::new(storage.clone());
        let b = SessionStore::new(storage.clone()).with_key("other");
        let (transcript, choices) = sample();

        a.save(&transcript, &choices).await;
        assert!(b.load().await.is_none());
        assert!(a.load().await.is_some());
    }
}
