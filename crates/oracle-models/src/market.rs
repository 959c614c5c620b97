use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prediction::Direction;

/// The two trading sessions a movement compares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovementDates {
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
}

/// Observed market movement between two closes. This is the ground truth
/// predictions are graded against.
///
/// Built only through [`MarketMovement::from_closes`], which derives `change`,
/// `change_percent` and `direction` from the closes. Deserializing goes
/// through the same derivation and rejects a stored direction that
/// disagrees with the closes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "StoredMovement")]
pub struct MarketMovement {
    direction: Direction,
    today_close: Decimal,
    yesterday_close: Decimal,
    change: Decimal,
    change_percent: Decimal,
    dates: MovementDates,
}

/// Why a serialized movement was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MovementError {
    #[error("closes must be positive: today {today}, yesterday {yesterday}")]
    NonPositiveClose { today: Decimal, yesterday: Decimal },

    #[error("direction {stored} does not match closes, which give {derived}")]
    DirectionMismatch {
        stored: Direction,
        derived: Direction,
    },
}

#[derive(Deserialize)]
struct StoredMovement {
    direction: Direction,
    today_close: Decimal,
    yesterday_close: Decimal,
    dates: MovementDates,
}

impl TryFrom<StoredMovement> for MarketMovement {
    type Error = MovementError;

    fn try_from(stored: StoredMovement) -> Result<Self, Self::Error> {
        let movement =
            Self::from_closes(stored.dates, stored.today_close, stored.yesterday_close).ok_or(
                MovementError::NonPositiveClose {
                    today: stored.today_close,
                    yesterday: stored.yesterday_close,
                },
            )?;
        if movement.direction != stored.direction {
            return Err(MovementError::DirectionMismatch {
                stored: stored.direction,
                derived: movement.direction,
            });
        }
        Ok(movement)
    }
}

impl MarketMovement {
    /// Derive the movement from two closes. Equal closes count as `DOWN`.
    ///
    /// Returns `None` unless both closes are strictly positive.
    pub fn from_closes(
        dates: MovementDates,
        today_close: Decimal,
        yesterday_close: Decimal,
    ) -> Option<Self> {
        if today_close <= Decimal::ZERO || yesterday_close <= Decimal::ZERO {
            return None;
        }

        let change = today_close - yesterday_close;
        let change_percent = change / yesterday_close * Decimal::ONE_HUNDRED;
        let direction = if today_close > yesterday_close {
            Direction::Up
        } else {
            Direction::Down
        };

        Some(Self {
            direction,
            today_close,
            yesterday_close,
            change,
            change_percent,
            dates,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn today_close(&self) -> Decimal {
        self.today_close
    }

    pub fn yesterday_close(&self) -> Decimal {
        self.yesterday_close
    }

    pub fn change(&self) -> Decimal {
        self.change
    }

    pub fn change_percent(&self) -> Decimal {
        self.change_percent
    }

    pub fn dates(&self) -> MovementDates {
        self.dates
    }
}

/// Latest quote for the tracked symbol, written by the collector and read by
/// analysts before they ask for a prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    /// ISO-8601 time the quote was fetched.
    pub timestamp: String,
    pub symbol: String,
    pub price: Decimal,
    /// Daily change as reported by the quote provider (e.g. `-0.2000%`).
    pub change_percent: String,
}
