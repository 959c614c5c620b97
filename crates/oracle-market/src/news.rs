//! NewsAPI headlines for the sentiment analyst.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::MarketError;

const EVERYTHING_URL: &str = "https://newsapi.org/v2/everything";
const PROVIDER: &str = "NewsAPI";
const MARKET_QUERY: &str = "market OR stocks OR economy OR \"Wall Street\" OR SPY OR \"S&P 500\"";

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    title: Option<String>,
}

pub struct NewsClient {
    client: Client,
    api_key: String,
}

impl NewsClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, MarketError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    pub fn from_env(var: &str, timeout: Duration) -> Result<Self, MarketError> {
        let api_key = std::env::var(var)
            .map_err(|_| MarketError::Config(format!("{var} environment variable not set")))?;
        Self::new(api_key, timeout)
    }

    /// Most recent English market headlines, newest first.
    pub async fn market_headlines(&self, limit: usize) -> Result<Vec<String>, MarketError> {
        let page_size = limit.clamp(1, 100).to_string();
        let response = self
            .client
            .get(EVERYTHING_URL)
            .query(&[
                ("q", MARKET_QUERY),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.as_u16() == 429 {
            return Err(MarketError::RateLimited {
                provider: PROVIDER,
                message: body,
            });
        }

        let headlines = parse_headlines(&body, limit)?;
        tracing::debug!(count = headlines.len(), "Fetched headlines");
        Ok(headlines)
    }
}

/// Titles from a `/v2/everything` body, skipping articles without one and
/// the `[Removed]` placeholders NewsAPI returns for withdrawn stories.
pub fn parse_headlines(body: &str, limit: usize) -> Result<Vec<String>, MarketError> {
    let parsed: EverythingResponse = serde_json::from_str(body)?;
    if parsed.status != "ok" {
        return Err(MarketError::Api {
            provider: PROVIDER,
            message: parsed.message.unwrap_or(parsed.status),
        });
    }

    Ok(parsed
        .articles
        .into_iter()
        .filter_map(|a| a.title)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "[Removed]")
        .take(limit)
        .collect())
}
