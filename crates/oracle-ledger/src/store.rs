use oracle_models::{PredictionRecord, ReputationBook};
use serde::Serialize;

use crate::error::LedgerError;

/// Position just past the last prediction a scoring pass has consumed.
///
/// The unit is backend specific (a byte offset for text files, a row id for
/// SQLite, an index for the in-memory store), so a watermark is only
/// meaningful to the prediction ledger of the same backend.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq, Hash)]
pub struct Watermark {
    pub position: u64,
    /// Fingerprint of the ledger bytes just before `position`. Set by
    /// backends whose positions survive an external rewrite of the ledger,
    /// so a rotated ledger can be told apart from a grown one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<u64>,
}

impl Watermark {
    pub const START: Watermark = Watermark::at(0);

    pub const fn at(position: u64) -> Self {
        Self {
            position,
            anchor: None,
        }
    }

    pub const fn anchored(position: u64, anchor: u64) -> Self {
        Self {
            position,
            anchor: Some(anchor),
        }
    }
}

/// Predictions recorded after a watermark, and the watermark to commit once
/// they have been scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingPredictions {
    pub records: Vec<PredictionRecord>,
    pub watermark: Watermark,
}

/// Append-only store of predictions. Implementations must tolerate partial
/// or corrupt entries by skipping them.
pub trait PredictionLedger: Send + Sync {
    /// Append one record to the end of the ledger.
    fn append(&self, record: &PredictionRecord) -> Result<(), LedgerError>;

    /// Everything recorded after `watermark`, in ledger order.
    fn read_since(&self, watermark: Watermark) -> Result<PendingPredictions, LedgerError>;

    /// Every well-formed record in the ledger, oldest first. A missing ledger
    /// reads as empty.
    fn read_all(&self) -> Result<Vec<PredictionRecord>, LedgerError> {
        Ok(self.read_since(Watermark::START)?.records)
    }
}

/// Fully rewritten store of per-agent reputation, plus the consumed
/// watermark that makes scoring runs idempotent.
pub trait ReputationLedger: Send + Sync {
    /// Current reputation. A missing ledger loads as empty.
    fn load(&self) -> Result<ReputationBook, LedgerError>;

    /// Replace the whole ledger with `book`, keeping the committed watermark.
    fn save(&self, book: &ReputationBook) -> Result<(), LedgerError>;

    /// The last committed watermark, `Watermark::START` if none.
    fn watermark(&self) -> Result<Watermark, LedgerError>;

    /// Persist `book` and `watermark` together: after a failure the ledger
    /// holds either both old values or both new ones.
    fn commit(&self, book: &ReputationBook, watermark: Watermark) -> Result<(), LedgerError>;
}
