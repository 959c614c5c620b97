//! Alpha Vantage client: daily closes for ground truth and the latest quote
//! for the market snapshot.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use oracle_models::{MarketMovement, MarketSnapshot, MovementDates};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::MarketError;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";
const DAILY_SERIES_KEY: &str = "Time Series (Daily)";
const GLOBAL_QUOTE_KEY: &str = "Global Quote";

#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, MarketError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    /// Create a client whose API key is read from the environment variable `var`.
    pub fn from_env(var: &str, timeout: Duration) -> Result<Self, MarketError> {
        let api_key = std::env::var(var)
            .map_err(|_| MarketError::Config(format!("{var} environment variable not set")))?;
        Self::new(api_key, timeout)
    }

    /// Movement between the most recent daily close and the close `days_ago`
    /// sessions before it.
    pub async fn daily_movement(
        &self,
        symbol: &str,
        days_ago: usize,
    ) -> Result<MarketMovement, MarketError> {
        let data = self.query("TIME_SERIES_DAILY", symbol).await?;
        parse_daily_movement(&data, days_ago)
    }

    /// Latest quote for `symbol`, stamped with `timestamp`.
    pub async fn global_quote(
        &self,
        symbol: &str,
        timestamp: &str,
    ) -> Result<MarketSnapshot, MarketError> {
        let data = self.query("GLOBAL_QUOTE", symbol).await?;
        parse_global_quote(&data, symbol, timestamp)
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value, MarketError> {
        tracing::debug!(function, symbol, "Querying Alpha Vantage");

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", function),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::Api {
                provider: PROVIDER,
                message: format!("HTTP error: {}", response.status()),
            });
        }

        let data: Value = response.json().await?;
        check_api_errors(&data)?;
        Ok(data)
    }
}

/// Alpha Vantage reports failures inside a 200 response body.
fn check_api_errors(data: &Value) -> Result<(), MarketError> {
    if let Some(message) = data.get("Error Message") {
        return Err(MarketError::Api {
            provider: PROVIDER,
            message: json_text(message),
        });
    }
    // "Note" is the per-minute limit, "Information" the daily limit or a
    // premium-only endpoint.
    for key in ["Note", "Information"] {
        if let Some(message) = data.get(key) {
            return Err(MarketError::RateLimited {
                provider: PROVIDER,
                message: json_text(message),
            });
        }
    }
    Ok(())
}

fn json_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn parse_decimal(value: Option<&Value>, field: &str) -> Result<Decimal, MarketError> {
    let text = value
        .and_then(Value::as_str)
        .ok_or_else(|| MarketError::NoData(format!("missing field {field:?}")))?;
    Decimal::from_str(text.trim())
        .map_err(|_| MarketError::NoData(format!("field {field:?} is not a number: {text:?}")))
}

/// Build the ground-truth movement from a `TIME_SERIES_DAILY` response.
///
/// Dates are sorted newest first; the newest close is "today" and the close
/// `days_ago` sessions earlier is "yesterday".
pub fn parse_daily_movement(data: &Value, days_ago: usize) -> Result<MarketMovement, MarketError> {
    if days_ago == 0 {
        return Err(MarketError::Config(
            "days_ago must be at least 1".to_string(),
        ));
    }

    let series = data
        .get(DAILY_SERIES_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| MarketError::NoData("no daily time series in response".to_string()))?;

    let mut dates: Vec<(NaiveDate, &Value)> = series
        .iter()
        .filter_map(|(date, bar)| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .ok()
                .map(|d| (d, bar))
        })
        .collect();
    dates.sort_by(|a, b| b.0.cmp(&a.0));

    if dates.len() <= days_ago {
        return Err(MarketError::NoData(format!(
            "need more than {days_ago} sessions, got {}",
            dates.len()
        )));
    }

    let (today, today_bar) = dates[0];
    let (yesterday, yesterday_bar) = dates[days_ago];
    let today_close = parse_decimal(today_bar.get("4. close"), "4. close")?;
    let yesterday_close = parse_decimal(yesterday_bar.get("4. close"), "4. close")?;

    MarketMovement::from_closes(
        MovementDates { today, yesterday },
        today_close,
        yesterday_close,
    )
    .ok_or_else(|| {
        MarketError::NoData(format!(
            "non-positive close ({today_close} on {today}, {yesterday_close} on {yesterday})"
        ))
    })
}

/// Build a snapshot from a `GLOBAL_QUOTE` response.
pub fn parse_global_quote(
    data: &Value,
    symbol: &str,
    timestamp: &str,
) -> Result<MarketSnapshot, MarketError> {
    let quote = data
        .get(GLOBAL_QUOTE_KEY)
        .and_then(Value::as_object)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| MarketError::NoData(format!("no quote for {symbol}")))?;

    let price = parse_decimal(quote.get("05. price"), "05. price")?;
    if price <= Decimal::ZERO {
        return Err(MarketError::NoData(format!(
            "non-positive price {price} for {symbol}"
        )));
    }

    let change_percent = quote
        .get("10. change percent")
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string();

    Ok(MarketSnapshot {
        timestamp: timestamp.to_string(),
        symbol: symbol.to_string(),
        price,
        change_percent,
    })
}
