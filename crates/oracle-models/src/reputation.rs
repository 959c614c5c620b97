use std::collections::BTreeMap;

use serde::Serialize;

use crate::prediction::{Confidence, Direction};

/// Per-agent running tally of graded predictions.
///
/// `total >= correct` holds for every value of this type: counts only come in
/// through [`ReputationEntry::from_counts`] (which rejects inconsistent pairs) or
/// [`ReputationEntry::record`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReputationEntry {
    agent: String,
    correct: u64,
    total: u64,
}

impl ReputationEntry {
    /// A fresh entry at 0/0.
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            correct: 0,
            total: 0,
        }
    }

    /// Rebuild an entry from persisted counts. `None` if `correct > total`.
    pub fn from_counts(agent: impl Into<String>, correct: u64, total: u64) -> Option<Self> {
        (correct <= total).then(|| Self {
            agent: agent.into(),
            correct,
            total,
        })
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn correct(&self) -> u64 {
        self.correct
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Percentage of correct predictions, 0 when nothing has been graded yet.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }

    /// Count one graded prediction.
    pub fn record(&mut self, is_correct: bool) {
        self.total += 1;
        if is_correct {
            self.correct += 1;
        }
    }
}

/// The full reputation ledger keyed by agent name.
///
/// Iteration is ordered by agent name so that a rewrite of the ledger is
/// deterministic.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReputationBook {
    entries: BTreeMap<String, ReputationEntry>,
}

impl ReputationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent: &str) -> Option<&ReputationEntry> {
        self.entries.get(agent)
    }

    /// Resolve the agent's entry, creating it at 0/0 on first sighting.
    pub fn entry_mut(&mut self, agent: &str) -> &mut ReputationEntry {
        self.entries
            .entry(agent.to_string())
            .or_insert_with(|| ReputationEntry::new(agent))
    }

    /// Insert or replace an entry. Returns the entry it replaced, if any.
    pub fn insert(&mut self, entry: ReputationEntry) -> Option<ReputationEntry> {
        self.entries.insert(entry.agent.clone(), entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReputationEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ReputationEntry> for ReputationBook {
    fn from_iter<I: IntoIterator<Item = ReputationEntry>>(iter: I) -> Self {
        let mut book = ReputationBook::new();
        for entry in iter {
            book.insert(entry);
        }
        book
    }
}

/// Outcome of grading a single prediction during a scoring pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Verdict {
    pub agent: String,
    pub predicted: Direction,
    pub actual: Direction,
    pub confidence: Confidence,
    pub is_correct: bool,
    /// The agent's accuracy right after this prediction was counted.
    pub running_accuracy: f64,
    pub running_correct: u64,
    pub running_total: u64,
}
