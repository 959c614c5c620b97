use serde::{Deserialize, Serialize};

/// Top-level configuration for the oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub ledger: LedgerConfig,
    pub market: MarketConfig,
    pub agents: AgentsConfig,
}

/// Which persisted store holds the prediction and reputation ledgers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Plain text files, one record per line.
    #[default]
    File,
    Sqlite,
}

/// Where the ledgers and the market snapshot live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// Append-only prediction ledger (file backend).
    pub predictions_path: String,
    /// Fully rewritten reputation ledger (file backend). The consumed
    /// watermark is kept next to it with a `.watermark` suffix.
    pub reputation_path: String,
    /// Database holding both ledgers (sqlite backend).
    pub sqlite_path: String,
    /// Latest quote written by `collect`, read by analysts.
    pub snapshot_path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::File,
            predictions_path: "data/predictions.txt".to_string(),
            reputation_path: "data/reputation_scores.txt".to_string(),
            sqlite_path: "data/oracle.db".to_string(),
            snapshot_path: "data/latest_market_data.txt".to_string(),
        }
    }
}

/// Market data and ground-truth source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    pub symbol: String,
    /// Number of sessions back the "yesterday" close is taken from.
    pub days_ago: usize,
    /// Upper bound on any single market-data fetch.
    pub fetch_timeout_seconds: u64,
    /// Environment variable holding the Alpha Vantage API key.
    pub alpha_vantage_key_env: String,
    /// Environment variable holding the NewsAPI key.
    pub news_api_key_env: String,
    /// Maximum headlines handed to sentiment analysts.
    pub headline_limit: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            days_ago: 1,
            fetch_timeout_seconds: 15,
            alpha_vantage_key_env: "ALPHA_VANTAGE_API_KEY".to_string(),
            news_api_key_env: "NEWS_API_KEY".to_string(),
            headline_limit: 15,
        }
    }
}

/// Configuration for the analyst agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Default model for analysts.
    pub model: String,
    /// Per-analyst LLM timeout in seconds.
    pub timeout_seconds: u64,
    pub analysts: Vec<AnalystConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout_seconds: 45,
            analysts: vec![
                AnalystConfig {
                    name: "TechnicalAnalyst".to_string(),
                    style: AnalystStyle::Technical,
                    model: None,
                    enabled: true,
                },
                AnalystConfig {
                    name: "SentimentAnalyst".to_string(),
                    style: AnalystStyle::Sentiment,
                    model: None,
                    enabled: true,
                },
            ],
        }
    }
}

/// What an analyst bases its call on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalystStyle {
    /// Price action only.
    Technical,
    /// Price plus recent news headlines.
    Sentiment,
}

/// Configuration for a single analyst agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    /// Agent name written into every prediction; the reputation key.
    pub name: String,
    pub style: AnalystStyle,
    /// Override model for this analyst. Falls back to `AgentsConfig::model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_oracle_config() {
        let config = OracleConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: OracleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn default_config_has_two_analysts() {
        let agents = AgentsConfig::default();
        assert_eq!(agents.analysts.len(), 2);
        assert!(agents.analysts.iter().all(|a| a.enabled));
        assert_eq!(agents.analysts[1].style, AnalystStyle::Sentiment);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: OracleConfig = toml::from_str("").unwrap();
        assert_eq!(config, OracleConfig::default());
        assert_eq!(config.ledger.backend, LedgerBackend::File);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[ledger]
backend = "sqlite"
sqlite_path = "/tmp/oracle_test.db"

[market]
symbol = "QQQ"
days_ago = 2

[agents]
model = "claude-sonnet-4-5-20250929"
timeout_seconds = 20

[[agents.analysts]]
name = "TechnicalAnalyst"
style = "technical"

[[agents.analysts]]
name = "SentimentAnalyst"
style = "sentiment"
model = "claude-3-5-haiku-latest"
enabled = false
"#;

        let config: OracleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(config.ledger.sqlite_path, "/tmp/oracle_test.db");
        // Unset keys in a present section still fall back to defaults
        assert_eq!(config.ledger.predictions_path, "data/predictions.txt");
        assert_eq!(config.market.symbol, "QQQ");
        assert_eq!(config.market.days_ago, 2);
        assert_eq!(config.market.fetch_timeout_seconds, 15);
        assert_eq!(config.agents.analysts.len(), 2);
        assert!(config.agents.analysts[0].enabled);
        assert!(!config.agents.analysts[1].enabled);
        assert_eq!(
            config.agents.analysts[1].model.as_deref(),
            Some("claude-3-5-haiku-latest")
        );
    }
}
