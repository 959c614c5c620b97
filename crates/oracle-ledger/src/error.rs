use std::path::PathBuf;

use oracle_models::UnknownToken;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A write to a ledger failed. Whatever was last written successfully is
    /// still in place.
    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed record at {location}: {source}")]
    MalformedRecord {
        location: String,
        source: RecordError,
    },

    #[error("Ledger not available: {0}")]
    Unavailable(String),
}

/// Why a single stored line could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected at least {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("{0}")]
    Token(#[from] UnknownToken),

    #[error("field {field} is not a valid number: {value:?}")]
    Number { field: &'static str, value: String },

    #[error("correct count {correct} exceeds total {total}")]
    Inconsistent { correct: u64, total: u64 },

    #[error("agent name is empty")]
    EmptyAgent,

    #[error("line is not valid UTF-8")]
    Encoding,
}
