use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("Analyst task failed: {0}")]
    Task(String),

    #[error("No analyst named {0:?} is configured and enabled")]
    UnknownAnalyst(String),

    #[error("No market snapshot at {0}; run `oracle collect` first")]
    MissingSnapshot(PathBuf),

    #[error("Ledger error: {0}")]
    Ledger(#[from] oracle_ledger::LedgerError),

    #[error("Market data error: {0}")]
    Market(#[from] oracle_market::MarketError),
}
