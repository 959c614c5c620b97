use std::sync::Mutex;

use oracle_models::{PredictionRecord, ReputationBook};

use crate::error::LedgerError;
use crate::store::{PendingPredictions, PredictionLedger, ReputationLedger, Watermark};

fn poisoned<T>(e: std::sync::PoisonError<T>) -> LedgerError {
    LedgerError::Unavailable(format!("memory ledger mutex poisoned: {e}"))
}

/// In-process prediction ledger. Watermarks are record indices.
#[derive(Default)]
pub struct MemoryPredictionLedger {
    records: Mutex<Vec<PredictionRecord>>,
}

impl MemoryPredictionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PredictionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl PredictionLedger for MemoryPredictionLedger {
    fn append(&self, record: &PredictionRecord) -> Result<(), LedgerError> {
        self.records.lock().map_err(poisoned)?.push(record.clone());
        Ok(())
    }

    fn read_since(&self, watermark: Watermark) -> Result<PendingPredictions, LedgerError> {
        let records = self.records.lock().map_err(poisoned)?;
        let start = usize::try_from(watermark.position)
            .unwrap_or(usize::MAX)
            .min(records.len());
        Ok(PendingPredictions {
            records: records[start..].to_vec(),
            watermark: Watermark::at(records.len() as u64),
        })
    }
}

#[derive(Default)]
struct ReputationState {
    book: ReputationBook,
    watermark: Watermark,
    writes: usize,
}

/// In-process reputation ledger. Counts writes so callers can assert that a
/// run did or did not persist.
#[derive(Default)]
pub struct MemoryReputationLedger {
    state: Mutex<ReputationState>,
}

impl MemoryReputationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(book: ReputationBook) -> Self {
        Self {
            state: Mutex::new(ReputationState {
                book,
                ..Default::default()
            }),
        }
    }

    /// Number of successful `save` / `commit` calls.
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|s| s.writes).unwrap_or(0)
    }
}

impl ReputationLedger for MemoryReputationLedger {
    fn load(&self) -> Result<ReputationBook, LedgerError> {
        Ok(self.state.lock().map_err(poisoned)?.book.clone())
    }

    fn save(&self, book: &ReputationBook) -> Result<(), LedgerError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.book = book.clone();
        state.writes += 1;
        Ok(())
    }

    fn watermark(&self) -> Result<Watermark, LedgerError> {
        Ok(self.state.lock().map_err(poisoned)?.watermark)
    }

    fn commit(&self, book: &ReputationBook, watermark: Watermark) -> Result<(), LedgerError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.book = book.clone();
        state.watermark = watermark;
        state.writes += 1;
        Ok(())
    }
}
