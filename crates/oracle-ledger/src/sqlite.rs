use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use oracle_models::{Confidence, Direction, PredictionRecord, ReputationBook, ReputationEntry};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, RecordError};
use crate::store::{PendingPredictions, PredictionLedger, ReputationLedger, Watermark};

/// Schema for the SQLite backend.
///
/// Predictions get an autoincrement row id, which doubles as the watermark.
/// Reputation rows and the watermark live in the same database so one
/// transaction commits both.
pub const LEDGER_DDL: &str = "\
CREATE TABLE IF NOT EXISTS predictions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    agent       TEXT NOT NULL,
    direction   TEXT NOT NULL,
    confidence  TEXT NOT NULL,
    reasoning   TEXT NOT NULL,
    timestamp   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reputation (
    agent       TEXT PRIMARY KEY,
    correct     INTEGER NOT NULL,
    total       INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS scoring_state (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    watermark   INTEGER NOT NULL
);
";

/// How long a writer waits on another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Both ledgers in one SQLite database.
///
/// Free text is stored as-is; there is no delimiter to escape.
/// Access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (creating if needed) a ledger database in WAL mode so agents can
    /// append while a scorer reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Persistence {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(LEDGER_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path = %path.display(), "Opened SQLite ledger");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(LEDGER_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|e| LedgerError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    fn write_reputation(tx: &rusqlite::Transaction<'_>, book: &ReputationBook) -> Result<(), LedgerError> {
        tx.execute("DELETE FROM reputation", [])?;
        let mut stmt =
            tx.prepare_cached("INSERT INTO reputation (agent, correct, total) VALUES (?1, ?2, ?3)")?;
        for entry in book.iter() {
            stmt.execute(rusqlite::params![
                entry.agent(),
                to_sql_count(entry.correct())?,
                to_sql_count(entry.total())?,
            ])?;
        }
        Ok(())
    }
}

fn to_sql_count(value: u64) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| {
        LedgerError::Unavailable(format!("count {value} does not fit in an SQLite integer"))
    })
}

fn decode_row(
    agent: String,
    direction: &str,
    confidence: &str,
    reasoning: String,
    timestamp: String,
) -> Result<PredictionRecord, RecordError> {
    if agent.is_empty() {
        return Err(RecordError::EmptyAgent);
    }
    let direction: Direction = direction.parse()?;
    let confidence: Confidence = confidence.parse()?;
    Ok(PredictionRecord {
        agent,
        direction,
        confidence,
        reasoning,
        timestamp,
    })
}

impl PredictionLedger for SqliteLedger {
    fn append(&self, record: &PredictionRecord) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO predictions (agent, direction, confidence, reasoning, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.agent,
                record.direction.as_str(),
                record.confidence.as_str(),
                record.reasoning,
                record.timestamp,
            ],
        )?;
        debug!(agent = %record.agent, "Appended prediction row");
        Ok(())
    }

    fn read_since(&self, watermark: Watermark) -> Result<PendingPredictions, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent, direction, confidence, reasoning, timestamp \
             FROM predictions WHERE id > ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![to_sql_count(watermark.position)?], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        let mut last_id = watermark.position;
        let mut skipped = 0usize;
        for (id, agent, direction, confidence, reasoning, timestamp) in rows {
            last_id = last_id.max(u64::try_from(id).unwrap_or(0));
            match decode_row(agent, &direction, &confidence, reasoning, timestamp) {
                Ok(record) => records.push(record),
                Err(source) => {
                    skipped += 1;
                    let err = LedgerError::MalformedRecord {
                        location: format!("predictions row {id}"),
                        source,
                    };
                    warn!(error = %err, "Skipping malformed prediction");
                }
            }
        }

        debug!(
            read = records.len(),
            skipped,
            from = watermark.position,
            "Read prediction rows"
        );

        Ok(PendingPredictions {
            records,
            watermark: Watermark::at(last_id),
        })
    }
}

impl ReputationLedger for SqliteLedger {
    fn load(&self) -> Result<ReputationBook, LedgerError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached("SELECT agent, correct, total FROM reputation ORDER BY agent")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut book = ReputationBook::new();
        for (agent, correct, total) in rows {
            let entry = match (u64::try_from(correct), u64::try_from(total)) {
                (Ok(correct), Ok(total)) => ReputationEntry::from_counts(agent.as_str(), correct, total)
                    .ok_or(RecordError::Inconsistent { correct, total }),
                (Err(_), _) => Err(RecordError::Number {
                    field: "correct",
                    value: correct.to_string(),
                }),
                (_, Err(_)) => Err(RecordError::Number {
                    field: "total",
                    value: total.to_string(),
                }),
            };
            match entry {
                Ok(entry) => {
                    book.insert(entry);
                }
                Err(source) => {
                    let err = LedgerError::MalformedRecord {
                        location: format!("reputation row {agent:?}"),
                        source,
                    };
                    warn!(error = %err, "Skipping malformed reputation entry");
                }
            }
        }
        Ok(book)
    }

    fn save(&self, book: &ReputationBook) -> Result<(), LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::write_reputation(&tx, book)?;
        tx.commit()?;
        Ok(())
    }

    fn watermark(&self) -> Result<Watermark, LedgerError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT watermark FROM scoring_state WHERE id = 1",
            [],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(value) => Ok(Watermark::at(u64::try_from(value).unwrap_or(0))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Watermark::START),
            Err(e) => Err(LedgerError::Sqlite(e)),
        }
    }

    fn commit(&self, book: &ReputationBook, watermark: Watermark) -> Result<(), LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::write_reputation(&tx, book)?;
        tx.execute(
            "INSERT OR REPLACE INTO scoring_state (id, watermark) VALUES (1, ?1)",
            rusqlite::params![to_sql_count(watermark.position)?],
        )?;
        tx.commit()?;
        info!(
            agents = book.len(),
            watermark = watermark.position,
            "Committed reputation ledger"
        );
        Ok(())
    }
}
