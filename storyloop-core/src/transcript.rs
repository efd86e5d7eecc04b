//! The story transcript: an append-only log of narration and player choices.

use serde::{Deserialize, Serialize};

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Story text written by the narrator.
    Narration,
    /// A continuation picked by the player.
    Choice,
}

impl EntryKind {
    /// The speaker label used in prompts and exports.
    pub fn speaker(self) -> &'static str {
        match self {
            EntryKind::Narration => "narrator",
            EntryKind::Choice => "player",
        }
    }
}

/// One immutable line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique within one transcript, non-decreasing in append order.
    pub id: u64,
    pub kind: EntryKind,
    pub text: String,
}

impl LogEntry {
    /// Render as a `"<speaker>: <text>"` line.
    pub fn line(&self) -> String {
        format!("{}: {}", self.kind.speaker(), self.text)
    }
}

/// Entry counts for a transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub narration: usize,
    pub choices: usize,
}

impl SessionStats {
    pub fn total(&self) -> usize {
        self.narration + self.choices
    }
}

/// Ordered, append-only log of [`LogEntry`] values.
///
/// The container does not police alternation between narration and
/// choices; callers append the right kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<LogEntry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from persisted entries.
    ///
    /// New ids continue after the largest restored id. Ids at the very top
    /// of the range saturate; loaded snapshots never carry them.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let next_id = entries
            .iter()
            .map(|e| e.id.saturating_add(1))
            .max()
            .unwrap_or(0);
        Self { entries, next_id }
    }

    /// Append an entry and return it.
    pub fn append(&mut self, kind: EntryKind, text: impl Into<String>) -> &LogEntry {
        let entry = LogEntry {
            id: self.next_id,
            kind,
            text: text.into(),
        };
        self.next_id = self.next_id.saturating_add(1);
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// An owned copy of the entries, detached from the live transcript.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.clone()
    }

    /// Drop every entry. Ids keep increasing across a restart.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// The most recent entry, if it is a player choice.
    pub fn pending_choice(&self) -> Option<&str> {
        self.last()
            .filter(|entry| entry.kind == EntryKind::Choice)
            .map(|entry| entry.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> SessionStats {
        self.entries
            .iter()
            .fold(SessionStats::default(), |mut stats, entry| {
                match entry.kind {
                    EntryKind::Narration => stats.narration += 1,
                    EntryKind::Choice => stats.choices += 1,
                }
                stats
            })
    }

    /// The transcript as `"<speaker>: <text>"` lines joined by newlines.
    pub fn export(&self) -> String {
        render_lines(&self.entries)
    }
}

/// Render entries as `"<speaker>: <text>"` lines joined by newlines.
pub fn render_lines(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(LogEntry::line)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_ids() {
        let mut transcript = Transcript::new();
        let first = transcript.append(EntryKind::Narration, "It rains.").id;
        let second = transcript.append(EntryKind::Choice, "Run").id;

        assert!(second > first);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.pending_choice(), Some("Run"));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "Once.");
        let snapshot = transcript.snapshot();

        transcript.append(EntryKind::Choice, "Again");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn clear_keeps_ids_monotonic() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "a");
        transcript.append(EntryKind::Choice, "b");
        transcript.clear();

        assert!(transcript.is_empty());
        assert_eq!(transcript.append(EntryKind::Narration, "c").id, 2);
    }

    #[test]
    fn from_entries_continues_after_max_id() {
        let mut transcript = Transcript::from_entries(vec![
            LogEntry { id: 7, kind: EntryKind::Narration, text: "x".into() },
            LogEntry { id: 9, kind: EntryKind::Choice, text: "y".into() },
        ]);
        assert_eq!(transcript.append(EntryKind::Narration, "z").id, 10);
    }

    #[test]
    fn from_entries_survives_max_id() {
        let transcript = Transcript::from_entries(vec![LogEntry {
            id: u64::MAX,
            kind: EntryKind::Narration,
            text: "x".into(),
        }]);
        assert_eq!(transcript.next_id, u64::MAX);
    }

    #[test]
    fn stats_and_export() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "You wake up in a ditch.");
        transcript.append(EntryKind::Choice, "Go left");
        transcript.append(EntryKind::Narration, "Left was worse.");

        let stats = transcript.stats();
        assert_eq!(stats.narration, 2);
        assert_eq!(stats.choices, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(
            transcript.export(),
            "narrator: You wake up in a ditch.\nplayer: Go left\nnarrator: Left was worse."
        );
    }

    #[test]
    fn empty_export_is_empty() {
        assert_eq!(Transcript::new().export(), "");
        assert_eq!(Transcript::new().pending_choice(), None);
    }

    #[test]
    fn entry_kind_serializes_snake_case() {
        let entry = LogEntry { id: 1, kind: EntryKind::Narration, text: "t".into() };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "narration");
    }
}
