//! Offline story generator of last resort.
//!
//! Produces a [`StorySegment`] without any network access by drawing from
//! fixed phrase pools. It never fails. The random source is a seedable
//! [`StdRng`], so a given seed and transcript always yield the same segment.

use crate::segment::{StorySegment, INSULT_CHOICE, RESTART_CHOICE};
use crate::transcript::Transcript;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Number of choices drawn for each fallback segment.
pub const CHOICE_COUNT: usize = 3;

const OPENINGS: &[&str] = &[
    "You wake up in a ditch behind the tavern, wearing somebody else's boots.",
    "The Hare limps into town with empty pockets and a head full of bad ideas.",
    "Dawn breaks over the village like a bottle over a skull.",
    "You are standing in the rain outside a pawnshop that closed an hour ago.",
    "A crow lands on your shoulder and looks at you with open contempt.",
];

const COMPLICATIONS: &[&str] = &[
    "A debt collector with one eyebrow and no patience is already walking your way.",
    "Your only friend owes money to the same people you do.",
    "The road ahead is flooded, and the road behind is full of angry farmers.",
    "Somebody has nailed a wanted poster with your face to the church door.",
    "Your purse is lighter than your sense of shame.",
];

const TWISTS: &[&str] = &[
    "Then the ground gives way beneath you, because of course it does.",
    "Out of nowhere, your mother-in-law appears and asks about the money.",
    "A goat chews through the last rope holding your plan together.",
    "The bell tower strikes thirteen and everyone turns to stare at you.",
    "Fate shrugs, spits, and keeps walking.",
];

const CHOICE_LABELS: &[&str] = &[
    "Go left",
    "Go right",
    "Run away",
    "Pick a fight",
    "Beg for mercy",
    "Steal something",
    "Hide in a barrel",
    RESTART_CHOICE,
];

const INSULT_RETORT: &str = "You hurl abuse at the narrator. The narrator takes notes and makes things worse.";

const STALLED: &str = "The story stalls, coughs, and lurches onward anyway.";

/// Phrase pools the generator draws from.
///
/// `choice_labels` entries are expected to be distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhrasePools {
    pub openings: Vec<String>,
    pub complications: Vec<String>,
    pub twists: Vec<String>,
    pub choice_labels: Vec<String>,
}

impl Default for PhrasePools {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            openings: owned(OPENINGS),
            complications: owned(COMPLICATIONS),
            twists: owned(TWISTS),
            choice_labels: owned(CHOICE_LABELS),
        }
    }
}

/// Deterministic-shape, random-content segment generator.
#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    rng: StdRng,
    pools: PhrasePools,
}

impl FallbackGenerator {
    /// Create a generator seeded from system entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a generator with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Create a generator around an existing random source.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            pools: PhrasePools::default(),
        }
    }

    /// Replace the phrase pools.
    pub fn with_pools(mut self, pools: PhrasePools) -> Self {
        self.pools = pools;
        self
    }

    /// Produce the next segment for `transcript`.
    pub fn generate(&mut self, transcript: &Transcript) -> StorySegment {
        let mut parts: Vec<String> = Vec::with_capacity(4);

        match transcript.pending_choice() {
            Some(INSULT_CHOICE) => parts.push(INSULT_RETORT.to_string()),
            Some(choice) => parts.push(format!("You chose \"{choice}\".")),
            None => {}
        }

        for pool in [&self.pools.openings, &self.pools.complications, &self.pools.twists] {
            if let Some(phrase) = pool.choose(&mut self.rng) {
                parts.push(phrase.clone());
            }
        }

        if parts.is_empty() {
            parts.push(STALLED.to_string());
        }

        StorySegment::new(parts.join(" "), self.draw_choices())
    }

    fn draw_choices(&mut self) -> Vec<String> {
        if self.pools.choice_labels.len() < CHOICE_COUNT {
            return vec![RESTART_CHOICE.to_string()];
        }
        self.pools
            .choice_labels
            .choose_multiple(&mut self.rng, CHOICE_COUNT)
            .cloned()
            .collect()
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::EntryKind;
    use std::collections::HashSet;

    #[test]
    fn same_seed_same_segment() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "It begins.");
        transcript.append(EntryKind::Choice, "Go left");

        let a = FallbackGenerator::seeded(42).generate(&transcript);
        let b = FallbackGenerator::seeded(42).generate(&transcript);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_transcript_draws_three_distinct_choices() {
        let mut generator = FallbackGenerator::seeded(7);
        for _ in 0..20 {
            let segment = generator.generate(&Transcript::new());
            assert!(!segment.narration.is_empty());
            assert_eq!(segment.choices.len(), CHOICE_COUNT);
            let unique: HashSet<_> = segment.choices.iter().collect();
            assert_eq!(unique.len(), CHOICE_COUNT);
            assert!(!segment.narration.contains("You chose"));
        }
    }

    #[test]
    fn references_latest_choice() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "A fork in the road.");
        transcript.append(EntryKind::Choice, "Hide in a barrel");

        let segment = FallbackGenerator::seeded(1).generate(&transcript);
        assert!(segment.narration.starts_with("You chose \"Hide in a barrel\"."));
    }

    #[test]
    fn ignores_choice_that_is_not_latest() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "Start.");
        transcript.append(EntryKind::Choice, "Go right");
        transcript.append(EntryKind::Narration, "Right was a mistake.");

        let segment = FallbackGenerator::seeded(1).generate(&transcript);
        assert!(!segment.narration.contains("Go right"));
    }

    #[test]
    fn insult_gets_a_retort() {
        let mut transcript = Transcript::new();
        transcript.append(EntryKind::Narration, "Start.");
        transcript.append(EntryKind::Choice, INSULT_CHOICE);

        let segment = FallbackGenerator::seeded(3).generate(&transcript);
        assert!(segment.narration.starts_with(INSULT_RETORT));
    }

    #[test]
    fn small_label_pool_falls_back_to_restart() {
        let pools = PhrasePools {
            choice_labels: vec!["Only".into(), "Two".into()],
            ..PhrasePools::default()
        };
        let segment = FallbackGenerator::seeded(9)
            .with_pools(pools)
            .generate(&Transcript::new());
        assert_eq!(segment.choices, vec![RESTART_CHOICE.to_string()]);
    }

    #[test]
    fn empty_phrase_pools_still_narrate() {
        let pools = PhrasePools {
            openings: vec![],
            complications: vec![],
            twists: vec![],
            ..PhrasePools::default()
        };
        let segment = FallbackGenerator::seeded(9)
            .with_pools(pools)
            .generate(&Transcript::new());
        assert_eq!(segment.narration, STALLED);
    }
}
