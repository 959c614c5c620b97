//! Analysts that answer without calling an LLM, for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use oracle_models::{AnalystStyle, Confidence, Direction, MarketSnapshot};

use crate::analyst::{Analyst, AnalystPrediction};
use crate::error::AgentError;
use crate::parser::parse_prediction_reply;

/// Replies with a fixed call, or fails, and counts how often it was asked.
pub struct ScriptedAnalyst {
    name: String,
    reply: Result<AnalystPrediction, String>,
    calls: AtomicUsize,
}

impl ScriptedAnalyst {
    pub fn new(name: &str, direction: Direction, confidence: Confidence) -> Self {
        Self {
            name: name.to_string(),
            reply: Ok(AnalystPrediction {
                direction,
                confidence,
                reasoning: format!("Scripted {name} call"),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Parse `reply` the way a real analyst reply is parsed. An unparseable
    /// reply makes every call fail with the parse error.
    pub fn from_reply(name: &str, reply: &str) -> Self {
        let reply = parse_prediction_reply(reply)
            .map(|p| AnalystPrediction {
                direction: p.direction,
                confidence: p.confidence,
                reasoning: p.reasoning,
            })
            .map_err(|e| e.to_string());
        Self {
            name: name.to_string(),
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: Err("Scripted failure".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyst for ScriptedAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn style(&self) -> AnalystStyle {
        AnalystStyle::Technical
    }

    async fn analyze(&self, _snapshot: &MarketSnapshot) -> Result<AnalystPrediction, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(AgentError::Cli)
    }
}
