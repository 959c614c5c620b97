use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Utc};
use oracle_models::{Direction, MarketMovement, MovementDates};
use rust_decimal::Decimal;

use crate::alpha_vantage::AlphaVantageClient;
use crate::error::MarketError;

/// Supplies the observed movement predictions are graded against.
#[async_trait]
pub trait MarketMovementSource: Send + Sync {
    /// Human-readable name for logs and reports.
    fn name(&self) -> &str;

    /// Whether this source reports a made-up movement rather than an observed one.
    fn is_simulated(&self) -> bool {
        false
    }

    async fn fetch_movement(&self) -> Result<MarketMovement, MarketError>;
}

/// Daily closes from Alpha Vantage.
pub struct AlphaVantageMovementSource {
    client: AlphaVantageClient,
    symbol: String,
    days_ago: usize,
}

impl AlphaVantageMovementSource {
    pub fn new(client: AlphaVantageClient, symbol: impl Into<String>, days_ago: usize) -> Self {
        Self {
            client,
            symbol: symbol.into(),
            days_ago,
        }
    }
}

#[async_trait]
impl MarketMovementSource for AlphaVantageMovementSource {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    async fn fetch_movement(&self) -> Result<MarketMovement, MarketError> {
        let movement = self.client.daily_movement(&self.symbol, self.days_ago).await?;
        tracing::info!(
            symbol = %self.symbol,
            direction = %movement.direction(),
            today = %movement.dates().today,
            yesterday = %movement.dates().yesterday,
            change_percent = %movement.change_percent().round_dp(2),
            "Fetched market movement"
        );
        Ok(movement)
    }
}

/// An operator-chosen movement for dry runs. Never used unless asked for.
pub struct SimulatedMovement {
    direction: Direction,
}

impl SimulatedMovement {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }
}

#[async_trait]
impl MarketMovementSource for SimulatedMovement {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn fetch_movement(&self) -> Result<MarketMovement, MarketError> {
        tracing::warn!(
            direction = %self.direction,
            "Using a SIMULATED market movement; scores will not reflect the real market"
        );

        let today = Utc::now().date_naive();
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let yesterday_close = Decimal::ONE_HUNDRED;
        let today_close = match self.direction {
            Direction::Up => yesterday_close + Decimal::ONE,
            Direction::Down => yesterday_close - Decimal::ONE,
        };

        MarketMovement::from_closes(
            MovementDates { today, yesterday },
            today_close,
            yesterday_close,
        )
        .ok_or_else(|| MarketError::NoData("simulated closes are not positive".to_string()))
    }
}

/// Returns a canned movement or failure, optionally after a delay.
/// Used to drive scoring runs in tests.
pub struct FixedMovementSource {
    outcome: Result<MarketMovement, String>,
    delay: Option<Duration>,
}

impl FixedMovementSource {
    pub fn new(movement: MarketMovement) -> Self {
        Self {
            outcome: Ok(movement),
            delay: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MarketMovementSource for FixedMovementSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch_movement(&self) -> Result<MarketMovement, MarketError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map_err(MarketError::NoData)
    }
}
