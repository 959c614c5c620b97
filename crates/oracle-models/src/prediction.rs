use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a ledger or model token is not one of the known spellings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} token: {token:?}")]
pub struct UnknownToken {
    pub kind: &'static str,
    pub token: String,
}

/// Next-session market direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact match on the ledger spelling (`UP` / `DOWN`).
impl FromStr for Direction {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            other => Err(UnknownToken {
                kind: "direction",
                token: other.to_string(),
            }),
        }
    }
}

/// How sure the predicting agent claims to be.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            other => Err(UnknownToken {
                kind: "confidence",
                token: other.to_string(),
            }),
        }
    }
}

/// One agent's call on the next session, as stored in the prediction ledger.
///
/// Immutable once appended. `timestamp` is kept as the ISO-8601 text that was
/// written so that records produced by older writers (naive local time) still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionRecord {
    pub agent: String,
    pub direction: Direction,
    pub confidence: Confidence,
    pub reasoning: String,
    pub timestamp: String,
}

impl PredictionRecord {
    pub fn new(
        agent: impl Into<String>,
        direction: Direction,
        confidence: Confidence,
        reasoning: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            direction,
            confidence,
            reasoning: reasoning.into(),
            timestamp: timestamp.into(),
        }
    }
}
