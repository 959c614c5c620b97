pub mod codec;
pub mod error;
pub mod file;
pub mod memory;
pub mod snapshot;
pub mod sqlite;
pub mod store;

pub use error::{LedgerError, RecordError};
pub use file::{write_atomic, FilePredictionLedger, FileReputationLedger};
pub use memory::{MemoryPredictionLedger, MemoryReputationLedger};
pub use snapshot::SnapshotFile;
pub use sqlite::SqliteLedger;
pub use store::{PendingPredictions, PredictionLedger, ReputationLedger, Watermark};
