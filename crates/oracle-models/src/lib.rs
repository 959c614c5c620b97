pub mod config;
pub mod market;
pub mod prediction;
pub mod reputation;

pub use config::{
    AgentsConfig, AnalystConfig, AnalystStyle, LedgerBackend, LedgerConfig, MarketConfig,
    OracleConfig,
};
pub use market::{MarketMovement, MarketSnapshot, MovementDates, MovementError};
pub use prediction::{Confidence, Direction, PredictionRecord, UnknownToken};
pub use reputation::{ReputationBook, ReputationEntry, Verdict};
