use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rate limit reached: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No usable data: {0}")]
    NoData(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),
}
