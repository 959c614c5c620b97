//! Stock Oracle: analysts predict the next session, a scorekeeper grades
//! them against the market and keeps a per-agent reputation.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use oracle::models::OracleConfig;
//! use oracle::scorer::{Scorekeeper, ScoreOutcome};
//! use oracle::ledger::{PredictionLedger, ReputationLedger};
//! ```

pub use oracle_agents as agents;
pub use oracle_ledger as ledger;
pub use oracle_market as market;
pub use oracle_models as models;

pub mod scorer;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use oracle_agents::claude_cli::ClaudeCliConfig;
use oracle_agents::{Analyst, ClaudeAnalyst, HeadlineSource, Orchestrator};
use oracle_ledger::{
    FilePredictionLedger, FileReputationLedger, LedgerError, PredictionLedger, ReputationLedger,
    SnapshotFile, SqliteLedger,
};
use oracle_market::{
    AlphaVantageClient, AlphaVantageMovementSource, MarketMovementSource, NewsClient,
    SimulatedMovement,
};
use oracle_models::{
    AnalystStyle, Direction, LedgerBackend, LedgerConfig, MarketSnapshot, OracleConfig,
};
use tracing::{info, warn};

use crate::scorer::Scorekeeper;

/// Read and parse a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<OracleConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// The prediction and reputation ledgers for the configured backend.
#[derive(Clone)]
pub struct Ledgers {
    pub predictions: Arc<dyn PredictionLedger>,
    pub reputation: Arc<dyn ReputationLedger>,
}

pub fn build_ledgers(config: &LedgerConfig) -> Result<Ledgers, LedgerError> {
    match config.backend {
        LedgerBackend::File => Ok(Ledgers {
            predictions: Arc::new(FilePredictionLedger::new(&config.predictions_path)),
            reputation: Arc::new(FileReputationLedger::new(&config.reputation_path)),
        }),
        LedgerBackend::Sqlite => {
            let db = Arc::new(SqliteLedger::open(&config.sqlite_path)?);
            Ok(Ledgers {
                predictions: db.clone(),
                reputation: db,
            })
        }
    }
}

fn fetch_timeout(config: &OracleConfig) -> Duration {
    Duration::from_secs(config.market.fetch_timeout_seconds)
}

/// The ground-truth source: Alpha Vantage, or a simulated movement when the
/// operator asked for one.
pub fn build_movement_source(
    config: &OracleConfig,
    simulate: Option<Direction>,
) -> anyhow::Result<Arc<dyn MarketMovementSource>> {
    if let Some(direction) = simulate {
        return Ok(Arc::new(SimulatedMovement::new(direction)));
    }
    let client =
        AlphaVantageClient::from_env(&config.market.alpha_vantage_key_env, fetch_timeout(config))
            .context("Failed to build Alpha Vantage client")?;
    Ok(Arc::new(AlphaVantageMovementSource::new(
        client,
        &config.market.symbol,
        config.market.days_ago,
    )))
}

/// Build a Scorekeeper from configuration.
pub fn build_scorekeeper(
    config: &OracleConfig,
    ledgers: &Ledgers,
    simulate: Option<Direction>,
) -> anyhow::Result<Scorekeeper> {
    Ok(Scorekeeper::new(
        ledgers.predictions.clone(),
        ledgers.reputation.clone(),
        build_movement_source(config, simulate)?,
        fetch_timeout(config),
    ))
}

/// Build an Orchestrator over every enabled analyst.
///
/// Sentiment analysts get a NewsAPI source when its key is set; without one
/// they run with no headlines.
pub fn build_orchestrator(
    config: &OracleConfig,
    ledger: Arc<dyn PredictionLedger>,
) -> anyhow::Result<Orchestrator> {
    let enabled: Vec<_> = config.agents.analysts.iter().filter(|a| a.enabled).collect();

    let headlines: Option<Arc<dyn HeadlineSource>> =
        if enabled.iter().any(|a| a.style == AnalystStyle::Sentiment) {
            match NewsClient::from_env(&config.market.news_api_key_env, fetch_timeout(config)) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn HeadlineSource>),
                Err(e) => {
                    warn!(error = %e, "News source unavailable; sentiment analysts will run without headlines");
                    None
                }
            }
        } else {
            None
        };

    let timeout = Duration::from_secs(config.agents.timeout_seconds);
    let analysts = enabled
        .into_iter()
        .map(|a| {
            let model = a
                .model
                .clone()
                .unwrap_or_else(|| config.agents.model.clone());
            let mut analyst =
                ClaudeAnalyst::new(a.name.clone(), a.style, ClaudeCliConfig::new(model, timeout));
            if let Some(source) = &headlines {
                analyst = analyst.with_headlines(source.clone(), config.market.headline_limit);
            }
            Arc::new(analyst) as Arc<dyn Analyst>
        })
        .collect();

    Ok(Orchestrator::new(analysts, ledger))
}

/// Fetch the latest quote and replace the snapshot file with it.
pub async fn collect(config: &OracleConfig) -> anyhow::Result<MarketSnapshot> {
    let client =
        AlphaVantageClient::from_env(&config.market.alpha_vantage_key_env, fetch_timeout(config))
            .context("Failed to build Alpha Vantage client")?;
    let timestamp = chrono::Utc::now().to_rfc3339();
    let snapshot = client
        .global_quote(&config.market.symbol, &timestamp)
        .await
        .with_context(|| format!("Failed to fetch quote for {}", config.market.symbol))?;

    SnapshotFile::new(&config.ledger.snapshot_path)
        .write(&snapshot)
        .context("Failed to write market snapshot")?;
    info!(
        symbol = %snapshot.symbol,
        price = %snapshot.price,
        change_percent = %snapshot.change_percent,
        "Collected market snapshot"
    );
    Ok(snapshot)
}

/// The snapshot analysts work from. Missing means `collect` has not run.
pub fn read_snapshot(config: &LedgerConfig) -> Result<MarketSnapshot, oracle_agents::AgentError> {
    let file = SnapshotFile::new(&config.snapshot_path);
    file.read()?
        .ok_or_else(|| oracle_agents::AgentError::MissingSnapshot(file.path().to_path_buf()))
}
