use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use oracle_models::{PredictionRecord, ReputationBook};
use tracing::{debug, info, warn};

use crate::codec::{self, Commit};
use crate::error::{LedgerError, RecordError};
use crate::store::{PendingPredictions, PredictionLedger, ReputationLedger, Watermark};

/// Write `bytes` to `path` so that readers only ever see the old or the new
/// contents.
///
/// Writes a uniquely named temp file next to the target, syncs it, then
/// renames it over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let persist = |source: io::Error| LedgerError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    ensure_parent_dir(path).map_err(persist)?;

    let tmp_path = sibling_path(path, &format!(".tmp.{}", uuid::Uuid::new_v4()));
    let result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(persist(e));
    }
    Ok(())
}

/// `path` with `suffix` appended to its file name.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Bytes before a watermark that its anchor fingerprints.
const ANCHOR_WINDOW: u64 = 256;

/// FNV-1a. Anchors are persisted, so the hash must not change between builds.
fn fingerprint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Up to `ANCHOR_WINDOW` bytes ending at `position`.
fn read_tail(file: &mut File, position: u64) -> io::Result<Vec<u8>> {
    let from = position.saturating_sub(ANCHOR_WINDOW);
    file.seek(SeekFrom::Start(from))?;
    let mut tail = vec![0; (position - from) as usize];
    file.read_exact(&mut tail)?;
    Ok(tail)
}

/// Prediction ledger stored as an append-only text file, one record per line.
///
/// Watermarks are byte offsets anchored to a fingerprint of the bytes just
/// before them, so a ledger that was rotated and has since grown past the old
/// offset is rescanned instead of being read from the middle of a line. Only
/// newline-terminated lines are consumed, so a line another process is still
/// writing is picked up by a later pass.
pub struct FilePredictionLedger {
    path: PathBuf,
}

impl FilePredictionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Where to resume reading: the watermark itself, or the start of the
    /// file when the bytes before the watermark are no longer the ones it
    /// was taken from.
    fn resume_position(
        &self,
        file: &mut File,
        len: u64,
        watermark: Watermark,
    ) -> Result<u64, LedgerError> {
        if watermark.position == 0 {
            return Ok(0);
        }
        if watermark.position > len {
            info!(
                path = %self.path.display(),
                watermark = watermark.position,
                len,
                "Prediction ledger is shorter than the watermark; rescanning from the start"
            );
            return Ok(0);
        }

        let tail = read_tail(file, watermark.position).map_err(|e| self.io_error(e))?;
        let intact = match watermark.anchor {
            Some(anchor) => fingerprint(&tail) == anchor,
            // Bare offsets must at least sit on a line boundary
            None => tail.last() == Some(&b'\n'),
        };
        if intact {
            return Ok(watermark.position);
        }

        info!(
            path = %self.path.display(),
            watermark = watermark.position,
            len,
            "Prediction ledger was rewritten since the watermark; rescanning from the start"
        );
        Ok(0)
    }

    fn watermark_at(&self, file: &mut File, position: u64) -> Result<Watermark, LedgerError> {
        if position == 0 {
            return Ok(Watermark::START);
        }
        let tail = read_tail(file, position).map_err(|e| self.io_error(e))?;
        Ok(Watermark::anchored(position, fingerprint(&tail)))
    }
}

impl PredictionLedger for FilePredictionLedger {
    fn append(&self, record: &PredictionRecord) -> Result<(), LedgerError> {
        let persist = |source: io::Error| LedgerError::Persistence {
            path: self.path.clone(),
            source,
        };
        let line = codec::encode_prediction(record);

        ensure_parent_dir(&self.path).map_err(persist)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(persist)?;
        // One write call per line keeps concurrent appenders line-aligned on
        // local filesystems.
        file.write_all(line.as_bytes()).map_err(persist)?;

        debug!(agent = %record.agent, path = %self.path.display(), "Appended prediction");
        Ok(())
    }

    fn read_since(&self, watermark: Watermark) -> Result<PendingPredictions, LedgerError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No prediction ledger yet");
                return Ok(PendingPredictions::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let len = file.metadata().map_err(|e| self.io_error(e))?.len();
        let start = self.resume_position(&mut file, len, watermark)?;

        file.seek(SeekFrom::Start(start))
            .map_err(|e| self.io_error(e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| self.io_error(e))?;

        let complete = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        if complete < bytes.len() {
            debug!(
                pending_bytes = bytes.len() - complete,
                "Leaving unterminated trailing line for a later pass"
            );
        }

        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut offset = start;
        for raw in bytes[..complete].split_inclusive(|&b| b == b'\n') {
            let line_offset = offset;
            offset += raw.len() as u64;

            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(_) => {
                    skipped += 1;
                    let err = RecordError::Encoding;
                    warn!(offset = line_offset, error = %err, "Skipping malformed prediction");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match codec::decode_prediction(line) {
                Ok(record) => records.push(record),
                Err(source) => {
                    skipped += 1;
                    let err = LedgerError::MalformedRecord {
                        location: format!("{} byte {line_offset}", self.path.display()),
                        source,
                    };
                    warn!(error = %err, "Skipping malformed prediction");
                }
            }
        }

        debug!(
            read = records.len(),
            skipped,
            from = start,
            "Read prediction ledger"
        );

        let watermark = self.watermark_at(&mut file, start + complete as u64)?;
        Ok(PendingPredictions { records, watermark })
    }
}

/// Reputation ledger stored as a text file that is rewritten in full.
///
/// Every write first replaces a `.watermark` sidecar holding the watermark
/// together with the book, then rewrites the ledger from it. The sidecar is
/// the commit point: if the ledger rewrite fails or the process dies before
/// it, `load` returns the committed book so counts and watermark still agree.
pub struct FileReputationLedger {
    path: PathBuf,
    watermark_path: PathBuf,
}

impl FileReputationLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let watermark_path = sibling_path(&path, ".watermark");
        Self {
            path,
            watermark_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn watermark_path(&self) -> &Path {
        &self.watermark_path
    }

    /// The last commit record, `None` if nothing was ever committed.
    fn read_commit(&self) -> Result<Option<Commit>, LedgerError> {
        let text = match fs::read_to_string(&self.watermark_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.watermark_path.clone(),
                    source,
                })
            }
        };

        // A corrupt commit is an error rather than a silent reset, which
        // would re-score every prediction in the ledger.
        codec::decode_commit(&text)
            .map(Some)
            .map_err(|source| LedgerError::MalformedRecord {
                location: self.watermark_path.display().to_string(),
                source,
            })
    }

    fn write_commit(&self, book: &ReputationBook, watermark: Watermark) -> Result<(), LedgerError> {
        write_atomic(
            &self.watermark_path,
            codec::encode_commit(book, watermark).as_bytes(),
        )?;
        write_atomic(&self.path, codec::encode_book(book).as_bytes())
    }

    fn load_ledger(&self) -> Result<ReputationBook, LedgerError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No reputation ledger yet; starting empty");
                return Ok(ReputationBook::new());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut book = ReputationBook::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match codec::decode_reputation(line) {
                Ok(entry) => {
                    let agent = entry.agent().to_string();
                    if book.insert(entry).is_some() {
                        warn!(agent = %agent, line = idx + 1, "Duplicate reputation entry; keeping the later line");
                    }
                }
                Err(source) => {
                    let err = LedgerError::MalformedRecord {
                        location: format!("{} line {}", self.path.display(), idx + 1),
                        source,
                    };
                    warn!(error = %err, "Skipping malformed reputation entry");
                }
            }
        }

        Ok(book)
    }
}

impl ReputationLedger for FileReputationLedger {
    fn load(&self) -> Result<ReputationBook, LedgerError> {
        let Some(Commit {
            book: Some(book), ..
        }) = self.read_commit()?
        else {
            return self.load_ledger();
        };

        let ledger = fs::read_to_string(&self.path).ok();
        if ledger.as_deref() != Some(codec::encode_book(&book).as_str()) {
            warn!(
                path = %self.path.display(),
                "Reputation ledger does not match the last commit; using the committed book"
            );
        }
        Ok(book)
    }

    fn save(&self, book: &ReputationBook) -> Result<(), LedgerError> {
        let watermark = self.watermark()?;
        self.write_commit(book, watermark)?;
        debug!(agents = book.len(), path = %self.path.display(), "Saved reputation ledger");
        Ok(())
    }

    fn watermark(&self) -> Result<Watermark, LedgerError> {
        Ok(self
            .read_commit()?
            .map_or(Watermark::START, |commit| commit.watermark))
    }

    fn commit(&self, book: &ReputationBook, watermark: Watermark) -> Result<(), LedgerError> {
        self.write_commit(book, watermark)?;
        info!(
            agents = book.len(),
            watermark = watermark.position,
            "Committed reputation ledger"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_models::{Confidence, Direction, ReputationEntry};

    fn record(agent: &str, direction: Direction) -> PredictionRecord {
        PredictionRecord::new(
            agent,
            direction,
            Confidence::Medium,
            "test reasoning",
            "2026-01-14T15:30:00+00:00",
        )
    }

    #[test]
    fn read_all_missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FilePredictionLedger::new(dir.path().join("predictions.txt"));
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_then_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FilePredictionLedger::new(dir.path().join("nested/predictions.txt"));

        ledger.append(&record("A", Direction::Up)).unwrap();
        ledger.append(&record("B", Direction::Down)).unwrap();
        ledger.append(&record("A", Direction::Down)).unwrap();

        let records = ledger.read_all().unwrap();
        let agents: Vec<&str> = records.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(agents, vec!["A", "B", "A"]);
        assert_eq!(records[1].direction, Direction::Down);
    }

    #[test]
    fn corrupt_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.txt");
        fs::write(
            &path,
            "A,UP,HIGH,one,2026-01-13\n\
             garbage line\n\
             B,DOWN,LOW,two,2026-01-13\n\
             \n\
             C,UP,MEDIUM,three,2026-01-13\n",
        )
        .unwrap();

        let ledger = FilePredictionLedger::new(&path);
        assert_eq!(ledger.read_all().unwrap().len(), 3);
    }

    #[test]
    fn trailing_partial_line_waits_for_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.txt");
        fs::write(&path, "A,UP,HIGH,one,2026-01-13\nB,DOWN,LO").unwrap();

        let ledger = FilePredictionLedger::new(&path);
        let pending = ledger.read_since(Watermark::START).unwrap();
        assert_eq!(pending.records.len(), 1);
        assert_eq!(pending.watermark.position, 25);

        // The writer finishes its line
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"W,two,2026-01-13\n").unwrap();

        let next = ledger.read_since(pending.watermark).unwrap();
        assert_eq!(next.records.len(), 1);
        assert_eq!(next.records[0].agent, "B");
        assert_eq!(next.watermark.position, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn read_since_returns_only_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FilePredictionLedger::new(dir.path().join("predictions.txt"));

        ledger.append(&record("A", Direction::Up)).unwrap();
        let first = ledger.read_since(Watermark::START).unwrap();
        assert_eq!(first.records.len(), 1);

        let none = ledger.read_since(first.watermark).unwrap();
        assert!(none.records.is_empty());
        assert_eq!(none.watermark, first.watermark);

        ledger.append(&record("B", Direction::Down)).unwrap();
        let second = ledger.read_since(first.watermark).unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].agent, "B");
    }

    #[test]
    fn truncated_ledger_is_rescanned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.txt");
        let ledger = FilePredictionLedger::new(&path);

        ledger.append(&record("A", Direction::Up)).unwrap();
        ledger.append(&record("B", Direction::Up)).unwrap();
        let consumed = ledger.read_since(Watermark::START).unwrap().watermark;

        // Rotated externally
        fs::write(&path, "C,DOWN,LOW,fresh,2026-01-15\n").unwrap();

        let pending = ledger.read_since(consumed).unwrap();
        assert_eq!(pending.records.len(), 1);
        assert_eq!(pending.records[0].agent, "C");
    }

    #[test]
    fn rotated_ledger_longer_than_watermark_is_rescanned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.txt");
        let ledger = FilePredictionLedger::new(&path);

        ledger.append(&record("A", Direction::Up)).unwrap();
        ledger.append(&record("B", Direction::Up)).unwrap();
        let consumed = ledger.read_since(Watermark::START).unwrap().watermark;

        // Replaced by a ledger that already runs past the old offset
        let rotated: String = ["C", "D", "E"]
            .iter()
            .map(|agent| {
                codec::encode_prediction(&PredictionRecord::new(
                    *agent,
                    Direction::Down,
                    Confidence::High,
                    "a considerably longer line of reasoning after rotation",
                    "2026-01-15T15:30:00+00:00",
                ))
            })
            .collect();
        fs::write(&path, &rotated).unwrap();
        assert!(rotated.len() as u64 > consumed.position);

        let pending = ledger.read_since(consumed).unwrap();
        let agents: Vec<&str> = pending.records.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(agents, vec!["C", "D", "E"]);
        assert_eq!(pending.watermark.position, rotated.len() as u64);
    }

    #[test]
    fn bare_offset_must_sit_on_a_line_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.txt");
        fs::write(&path, "A,UP,HIGH,one,2026-01-13\nB,DOWN,LOW,two,2026-01-13\n").unwrap();
        let ledger = FilePredictionLedger::new(&path);

        let resumed = ledger.read_since(Watermark::at(25)).unwrap();
        assert_eq!(resumed.records.len(), 1);
        assert_eq!(resumed.records[0].agent, "B");

        let rescanned = ledger.read_since(Watermark::at(10)).unwrap();
        assert_eq!(rescanned.records.len(), 2);
    }

    #[test]
    fn load_missing_reputation_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileReputationLedger::new(dir.path().join("reputation_scores.txt"));
        assert!(ledger.load().unwrap().is_empty());
        assert_eq!(ledger.watermark().unwrap(), Watermark::START);
    }

    #[test]
    fn save_load_roundtrip_preserves_triples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reputation_scores.txt");
        fs::write(
            &path,
            "TechnicalAnalyst,3,4,75.0%\nSentimentAnalyst,0,2,0.0%\nNewAgent,0,0\n",
        )
        .unwrap();

        let ledger = FileReputationLedger::new(&path);
        let book = ledger.load().unwrap();
        ledger.save(&book).unwrap();
        let reloaded = ledger.load().unwrap();

        assert_eq!(book, reloaded);
        assert_eq!(reloaded.get("TechnicalAnalyst").unwrap().correct(), 3);
        assert_eq!(reloaded.get("NewAgent").unwrap().total(), 0);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "NewAgent,0,0,0.0%\nSentimentAnalyst,0,2,0.0%\nTechnicalAnalyst,3,4,75.0%\n"
        );
    }

    #[test]
    fn malformed_reputation_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reputation_scores.txt");
        fs::write(&path, "A,1,2,50.0%\nB,x,2,0%\nC,5,1,500%\nD,2,2,100.0%\n").unwrap();

        let book = FileReputationLedger::new(&path).load().unwrap();
        assert_eq!(book.len(), 2);
        assert!(book.get("B").is_none());
        assert!(book.get("C").is_none());
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileReputationLedger::new(dir.path().join("reputation_scores.txt"));
        let book: ReputationBook = vec![ReputationEntry::from_counts("A", 1, 1).unwrap()]
            .into_iter()
            .collect();

        ledger.commit(&book, Watermark::at(42)).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["reputation_scores.txt", "reputation_scores.txt.watermark"]
        );
        assert_eq!(ledger.watermark().unwrap(), Watermark::at(42));
    }

    #[test]
    fn corrupt_watermark_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileReputationLedger::new(dir.path().join("reputation_scores.txt"));
        fs::write(ledger.watermark_path(), "not-a-number\n").unwrap();
        assert!(matches!(
            ledger.watermark(),
            Err(LedgerError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn failed_ledger_rewrite_keeps_book_and_watermark_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reputation_scores.txt");
        let ledger = FileReputationLedger::new(&path);

        let before: ReputationBook = vec![ReputationEntry::from_counts("A", 1, 2).unwrap()]
            .into_iter()
            .collect();
        ledger.commit(&before, Watermark::anchored(50, 1)).unwrap();

        // A directory in the ledger's place makes the second rename fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("blocker"), "x").unwrap();

        let after: ReputationBook = vec![ReputationEntry::from_counts("A", 2, 3).unwrap()]
            .into_iter()
            .collect();
        let err = ledger.commit(&after, Watermark::anchored(75, 2)).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence { .. }));

        assert_eq!(ledger.watermark().unwrap(), Watermark::anchored(75, 2));
        assert_eq!(ledger.load().unwrap(), after);

        // The next successful write brings the ledger file back in line
        fs::remove_dir_all(&path).unwrap();
        ledger.save(&after).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "A,2,3,66.7%\n");
        assert_eq!(ledger.watermark().unwrap(), Watermark::anchored(75, 2));
    }

    #[test]
    fn bare_offset_sidecar_reads_book_from_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileReputationLedger::new(dir.path().join("reputation_scores.txt"));
        fs::write(ledger.path(), "A,3,4,75.0%\n").unwrap();
        fs::write(ledger.watermark_path(), "412\n").unwrap();

        assert_eq!(ledger.watermark().unwrap(), Watermark::at(412));
        assert_eq!(ledger.load().unwrap().get("A").unwrap().correct(), 3);
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
