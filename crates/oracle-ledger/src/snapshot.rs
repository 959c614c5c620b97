use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use oracle_models::MarketSnapshot;
use tracing::debug;

use crate::codec;
use crate::error::LedgerError;
use crate::file::write_atomic;

/// Latest market quote written by the collector and read by analysts.
///
/// The file holds a single snapshot and is replaced on every write.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored snapshot, or `None` if nothing has been collected yet.
    pub fn read(&self) -> Result<Option<MarketSnapshot>, LedgerError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        codec::decode_snapshot(&text)
            .map(Some)
            .map_err(|source| LedgerError::MalformedRecord {
                location: self.path.display().to_string(),
                source,
            })
    }

    pub fn write(&self, snapshot: &MarketSnapshot) -> Result<(), LedgerError> {
        write_atomic(&self.path, codec::encode_snapshot(snapshot).as_bytes())?;
        debug!(
            path = %self.path.display(),
            symbol = %snapshot.symbol,
            price = %snapshot.price,
            "Wrote market snapshot"
        );
        Ok(())
    }
}
