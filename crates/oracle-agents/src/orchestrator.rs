use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use oracle_ledger::PredictionLedger;
use oracle_models::{MarketSnapshot, PredictionRecord};
use tracing::{error, info, warn};

use crate::analyst::{Analyst, AnalystPrediction};
use crate::error::AgentError;

/// What one analyst produced in a prediction round.
#[derive(Debug)]
pub struct AnalystOutcome {
    pub agent: String,
    /// The appended record, or why nothing was appended.
    pub result: Result<PredictionRecord, AgentError>,
    pub elapsed: Duration,
}

/// Stamp a prediction with the current UTC time.
pub fn stamp_prediction(agent: &str, prediction: AnalystPrediction) -> PredictionRecord {
    PredictionRecord::new(
        agent,
        prediction.direction,
        prediction.confidence,
        prediction.reasoning,
        Utc::now().to_rfc3339(),
    )
}

/// Runs analysts against the latest snapshot and appends their calls to the
/// prediction ledger.
pub struct Orchestrator {
    analysts: Vec<Arc<dyn Analyst>>,
    ledger: Arc<dyn PredictionLedger>,
}

impl Orchestrator {
    pub fn new(analysts: Vec<Arc<dyn Analyst>>, ledger: Arc<dyn PredictionLedger>) -> Self {
        Self { analysts, ledger }
    }

    pub fn analyst_names(&self) -> Vec<&str> {
        self.analysts.iter().map(|a| a.name()).collect()
    }

    /// Run every analyst, or only the one named `only`.
    ///
    /// Analysts run concurrently. Successful calls are appended in roster
    /// order; a failing analyst is reported and does not stop the others.
    pub async fn run(
        &self,
        snapshot: &MarketSnapshot,
        only: Option<&str>,
    ) -> Result<Vec<AnalystOutcome>, AgentError> {
        let selected: Vec<Arc<dyn Analyst>> = match only {
            Some(name) => {
                let matched: Vec<_> = self
                    .analysts
                    .iter()
                    .filter(|a| a.name() == name)
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return Err(AgentError::UnknownAnalyst(name.to_string()));
                }
                matched
            }
            None => self.analysts.clone(),
        };

        let start = Instant::now();
        info!(
            symbol = %snapshot.symbol,
            price = %snapshot.price,
            analysts = selected.len(),
            "Starting prediction round"
        );

        let mut handles = Vec::new();
        for analyst in selected {
            let snapshot = snapshot.clone();
            let name = analyst.name().to_string();
            let handle = tokio::spawn(async move {
                let agent_start = Instant::now();
                let result = analyst.analyze(&snapshot).await;
                (result, agent_start.elapsed())
            });
            handles.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (agent, handle) in handles {
            let (result, elapsed) = match handle.await {
                Ok((Ok(prediction), elapsed)) => {
                    let record = stamp_prediction(&agent, prediction);
                    let appended = self.ledger.append(&record).map(|()| record);
                    (appended.map_err(AgentError::from), elapsed)
                }
                Ok((Err(e), elapsed)) => (Err(e), elapsed),
                Err(e) => {
                    error!(agent = %agent, error = %e, "Analyst task panicked");
                    (Err(AgentError::Task(e.to_string())), Duration::ZERO)
                }
            };

            match &result {
                Ok(record) => info!(
                    agent = %agent,
                    direction = %record.direction,
                    confidence = %record.confidence,
                    elapsed_ms = elapsed.as_millis(),
                    "Prediction recorded"
                ),
                Err(e) => warn!(
                    agent = %agent,
                    error = %e,
                    elapsed_ms = elapsed.as_millis(),
                    "Analyst failed; nothing recorded"
                ),
            }
            outcomes.push(AnalystOutcome {
                agent,
                result,
                elapsed,
            });
        }

        info!(
            recorded = outcomes.iter().filter(|o| o.result.is_ok()).count(),
            failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Prediction round complete"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedAnalyst;
    use oracle_ledger::MemoryPredictionLedger;
    use oracle_models::{Confidence, Direction};
    use rust_decimal_macros::dec;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            timestamp: "2026-01-14T15:30:00+00:00".to_string(),
            symbol: "SPY".to_string(),
            price: dec!(693.77),
            change_percent: "-0.2000%".to_string(),
        }
    }

    fn orchestrator(ledger: Arc<MemoryPredictionLedger>) -> Orchestrator {
        Orchestrator::new(
            vec![
                Arc::new(ScriptedAnalyst::new(
                    "TechnicalAnalyst",
                    Direction::Up,
                    Confidence::High,
                )) as Arc<dyn Analyst>,
                Arc::new(ScriptedAnalyst::failing("SentimentAnalyst")) as Arc<dyn Analyst>,
                Arc::new(ScriptedAnalyst::new(
                    "ContrarianAnalyst",
                    Direction::Down,
                    Confidence::Low,
                )) as Arc<dyn Analyst>,
            ],
            ledger,
        )
    }

    #[tokio::test]
    async fn failing_analyst_does_not_stop_the_others() {
        let ledger = Arc::new(MemoryPredictionLedger::new());
        let outcomes = orchestrator(ledger.clone())
            .run(&snapshot(), None)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[2].result.is_ok());

        let records = ledger.read_all().unwrap();
        let agents: Vec<_> = records.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(agents, vec!["TechnicalAnalyst", "ContrarianAnalyst"]);
        assert_eq!(records[1].direction, Direction::Down);
    }

    #[tokio::test]
    async fn run_single_named_analyst() {
        let ledger = Arc::new(MemoryPredictionLedger::new());
        let outcomes = orchestrator(ledger.clone())
            .run(&snapshot(), Some("ContrarianAnalyst"))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(ledger.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_analyst_is_an_error() {
        let ledger = Arc::new(MemoryPredictionLedger::new());
        let err = orchestrator(ledger.clone())
            .run(&snapshot(), Some("Nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownAnalyst(name) if name == "Nobody"));
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn stamped_records_carry_rfc3339_time() {
        let record = stamp_prediction(
            "A",
            AnalystPrediction {
                direction: Direction::Up,
                confidence: Confidence::Medium,
                reasoning: "r".to_string(),
            },
        );
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }
}
