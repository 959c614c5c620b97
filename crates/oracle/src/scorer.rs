//! Grading predictions against the observed market and keeping per-agent
//! reputation.

use std::sync::Arc;
use std::time::Duration;

use oracle_ledger::{LedgerError, PredictionLedger, ReputationLedger, Watermark};
use oracle_market::{MarketError, MarketMovementSource};
use oracle_models::{MarketMovement, PredictionRecord, ReputationBook, ReputationEntry, Verdict};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ScoreError {
    /// No usable ground truth. Nothing was written.
    #[error("Ground truth unavailable: {0}")]
    GroundTruthUnavailable(#[source] MarketError),

    #[error("Failed to load ledger: {0}")]
    Load(#[source] LedgerError),

    /// The reputation ledger or watermark could not be written. The ledger
    /// still holds the last successful write.
    #[error("Failed to persist reputation: {0}")]
    Persistence(#[source] LedgerError),
}

/// Updated reputation plus one verdict per graded prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub book: ReputationBook,
    pub verdicts: Vec<Verdict>,
}

/// Grade `predictions` in order against `actual` on top of `book`.
///
/// Each prediction counts once, including repeats from the same agent.
pub fn score(
    mut book: ReputationBook,
    predictions: &[PredictionRecord],
    actual: &MarketMovement,
) -> ScoreCard {
    let mut verdicts = Vec::with_capacity(predictions.len());

    for record in predictions {
        let is_correct = record.direction == actual.direction();
        let entry = book.entry_mut(&record.agent);
        entry.record(is_correct);

        debug!(
            agent = %record.agent,
            predicted = %record.direction,
            actual = %actual.direction(),
            is_correct,
            "Graded prediction"
        );

        verdicts.push(Verdict {
            agent: record.agent.clone(),
            predicted: record.direction,
            actual: actual.direction(),
            confidence: record.confidence,
            is_correct,
            running_accuracy: entry.accuracy(),
            running_correct: entry.correct(),
            running_total: entry.total(),
        });
    }

    ScoreCard { book, verdicts }
}

/// How far a scoring run got.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStage {
    Idle,
    LoadedPredictions,
    LoadedScores,
    Scored,
    Persisted,
}

/// One agent's line in the standings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Standing {
    pub agent: String,
    pub correct: u64,
    pub total: u64,
    pub accuracy: f64,
}

impl From<&ReputationEntry> for Standing {
    fn from(entry: &ReputationEntry) -> Self {
        Self {
            agent: entry.agent().to_string(),
            correct: entry.correct(),
            total: entry.total(),
            accuracy: entry.accuracy(),
        }
    }
}

/// Standings sorted by agent name.
pub fn standings(book: &ReputationBook) -> Vec<Standing> {
    book.iter().map(Standing::from).collect()
}

/// A completed scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub source: String,
    pub simulated: bool,
    pub movement: MarketMovement,
    pub verdicts: Vec<Verdict>,
    pub standings: Vec<Standing>,
    pub watermark: Watermark,
    pub stage: RunStage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScoreOutcome {
    /// Nothing new to grade; the ledgers were not touched.
    NoPendingPredictions { stage: RunStage },
    Scored(ScoreReport),
}

/// Runs scoring passes: load what is new, fetch ground truth, grade, commit.
pub struct Scorekeeper {
    predictions: Arc<dyn PredictionLedger>,
    reputation: Arc<dyn ReputationLedger>,
    source: Arc<dyn MarketMovementSource>,
    fetch_timeout: Duration,
}

impl Scorekeeper {
    pub fn new(
        predictions: Arc<dyn PredictionLedger>,
        reputation: Arc<dyn ReputationLedger>,
        source: Arc<dyn MarketMovementSource>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            predictions,
            reputation,
            source,
            fetch_timeout,
        }
    }

    /// One scoring pass.
    ///
    /// Only predictions after the committed watermark are graded, unless
    /// `rescore_all` is set, in which case the whole ledger is replayed on
    /// top of the current reputation. Nothing is written unless the pass
    /// reaches the final commit.
    pub async fn run(&self, rescore_all: bool) -> Result<ScoreOutcome, ScoreError> {
        let mut stage = RunStage::Idle;

        let from = if rescore_all {
            warn!("Rescoring the entire prediction ledger; agents will be credited again for already-scored predictions");
            Watermark::START
        } else {
            self.reputation.watermark().map_err(ScoreError::Load)?
        };

        let pending = self
            .predictions
            .read_since(from)
            .map_err(ScoreError::Load)?;
        stage = advance(stage, RunStage::LoadedPredictions);
        info!(
            pending = pending.records.len(),
            from = from.position,
            to = pending.watermark.position,
            "Loaded predictions"
        );

        if pending.records.is_empty() {
            info!("No new predictions to score");
            return Ok(ScoreOutcome::NoPendingPredictions { stage });
        }

        let book = self.reputation.load().map_err(ScoreError::Load)?;
        stage = advance(stage, RunStage::LoadedScores);
        debug!(agents = book.len(), "Loaded reputation");

        let movement = self.fetch_ground_truth().await?;

        let card = score(book, &pending.records, &movement);
        stage = advance(stage, RunStage::Scored);

        self.reputation
            .commit(&card.book, pending.watermark)
            .map_err(ScoreError::Persistence)?;
        stage = advance(stage, RunStage::Persisted);

        let correct = card.verdicts.iter().filter(|v| v.is_correct).count();
        info!(
            scored = card.verdicts.len(),
            correct,
            actual = %movement.direction(),
            simulated = self.source.is_simulated(),
            "Scoring run complete"
        );

        Ok(ScoreOutcome::Scored(ScoreReport {
            source: self.source.name().to_string(),
            simulated: self.source.is_simulated(),
            movement,
            standings: standings(&card.book),
            verdicts: card.verdicts,
            watermark: pending.watermark,
            stage,
        }))
    }

    async fn fetch_ground_truth(&self) -> Result<MarketMovement, ScoreError> {
        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch_movement())
            .await
            .unwrap_or_else(|_| Err(MarketError::Timeout(self.fetch_timeout.as_secs())));

        fetched.map_err(|e| {
            warn!(source = self.source.name(), error = %e, "Ground truth unavailable; aborting without writing");
            ScoreError::GroundTruthUnavailable(e)
        })
    }
}

fn advance(from: RunStage, to: RunStage) -> RunStage {
    debug!(?from, ?to, "Scoring run stage");
    to
}
