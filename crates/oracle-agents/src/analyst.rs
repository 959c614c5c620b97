use std::sync::Arc;

use async_trait::async_trait;
use oracle_market::{MarketError, NewsClient};
use oracle_models::{AnalystStyle, Confidence, Direction, MarketSnapshot};
use tracing::{debug, warn};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::{parse_headline_selection, parse_prediction_reply};
use crate::prompts::{
    headline_selection_prompt, sentiment_user_prompt, system_prompt, technical_user_prompt, News,
    HEADLINE_EDITOR_PROMPT,
};

/// An analyst's call for the next session, before it is stamped and recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalystPrediction {
    pub direction: Direction,
    pub confidence: Confidence,
    pub reasoning: String,
}

/// Trait for analyst agents. Mockable for testing.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Agent name recorded with each prediction.
    fn name(&self) -> &str;
    fn style(&self) -> AnalystStyle;

    async fn analyze(&self, snapshot: &MarketSnapshot) -> Result<AnalystPrediction, AgentError>;
}

/// Where sentiment analysts get their news.
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn headlines(&self, limit: usize) -> Result<Vec<String>, MarketError>;
}

#[async_trait]
impl HeadlineSource for NewsClient {
    async fn headlines(&self, limit: usize) -> Result<Vec<String>, MarketError> {
        self.market_headlines(limit).await
    }
}

/// Picks the market-relevant headlines out of a raw feed before a sentiment
/// analyst sees them.
#[async_trait]
pub trait HeadlineFilter: Send + Sync {
    async fn select(&self, headlines: &[String]) -> Result<Vec<String>, AgentError>;
}

/// Asks Claude, acting as a financial news editor, which headlines matter.
pub struct ClaudeHeadlineFilter {
    cli_config: ClaudeCliConfig,
}

impl ClaudeHeadlineFilter {
    pub fn new(cli_config: ClaudeCliConfig) -> Self {
        Self { cli_config }
    }
}

#[async_trait]
impl HeadlineFilter for ClaudeHeadlineFilter {
    async fn select(&self, headlines: &[String]) -> Result<Vec<String>, AgentError> {
        let reply = invoke_claude(
            HEADLINE_EDITOR_PROMPT,
            &headline_selection_prompt(headlines),
            &self.cli_config,
        )
        .await?;
        Ok(parse_headline_selection(&reply, headlines))
    }
}

/// An analyst backed by the Claude CLI.
pub struct ClaudeAnalyst {
    name: String,
    style: AnalystStyle,
    cli_config: ClaudeCliConfig,
    headlines: Option<Arc<dyn HeadlineSource>>,
    headline_limit: usize,
    filter: Arc<dyn HeadlineFilter>,
}

impl ClaudeAnalyst {
    /// Sentiment analysts filter headlines through Claude with the same CLI
    /// settings unless [`ClaudeAnalyst::with_headline_filter`] says otherwise.
    pub fn new(name: impl Into<String>, style: AnalystStyle, cli_config: ClaudeCliConfig) -> Self {
        Self {
            name: name.into(),
            style,
            filter: Arc::new(ClaudeHeadlineFilter::new(cli_config.clone())),
            cli_config,
            headlines: None,
            headline_limit: 15,
        }
    }

    pub fn with_headline_filter(mut self, filter: Arc<dyn HeadlineFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Attach a headline source. Only sentiment analysts consult it.
    pub fn with_headlines(mut self, source: Arc<dyn HeadlineSource>, limit: usize) -> Self {
        self.headlines = Some(source);
        self.headline_limit = limit;
        self
    }

    /// Recent headlines, or none if the source is missing or fails.
    async fn fetch_headlines(&self) -> Vec<String> {
        let Some(source) = &self.headlines else {
            warn!(agent = %self.name, "No headline source configured; analysing without news");
            return Vec::new();
        };
        match source.headlines(self.headline_limit).await {
            Ok(headlines) => {
                debug!(agent = %self.name, count = headlines.len(), "Headlines fetched");
                headlines
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Headline fetch failed; analysing without news");
                Vec::new()
            }
        }
    }

    /// Fetched headlines narrowed to the relevant ones. If the filter fails
    /// the whole feed is passed on.
    async fn gather_news(&self) -> News {
        let fetched = self.fetch_headlines().await;
        if fetched.is_empty() {
            return News::Unavailable;
        }

        match self.filter.select(&fetched).await {
            Ok(selected) if selected.is_empty() => {
                debug!(agent = %self.name, fetched = fetched.len(), "No headline judged relevant");
                News::NothingRelevant
            }
            Ok(selected) => {
                debug!(
                    agent = %self.name,
                    fetched = fetched.len(),
                    selected = selected.len(),
                    "Headlines selected"
                );
                News::Headlines(selected)
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Headline selection failed; using the unfiltered feed");
                News::Headlines(fetched)
            }
        }
    }

    pub(crate) async fn user_prompt(&self, snapshot: &MarketSnapshot) -> String {
        match self.style {
            AnalystStyle::Technical => technical_user_prompt(snapshot),
            AnalystStyle::Sentiment => sentiment_user_prompt(snapshot, &self.gather_news().await),
        }
    }
}

#[async_trait]
impl Analyst for ClaudeAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn style(&self) -> AnalystStyle {
        self.style
    }

    async fn analyze(&self, snapshot: &MarketSnapshot) -> Result<AnalystPrediction, AgentError> {
        let user_prompt = self.user_prompt(snapshot).await;
        let raw_output =
            invoke_claude(system_prompt(self.style), &user_prompt, &self.cli_config).await?;
        debug!(agent = %self.name, reply = %raw_output.trim(), "Analyst replied");

        let parsed = parse_prediction_reply(&raw_output)?;
        Ok(AnalystPrediction {
            direction: parsed.direction,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
        })
    }
}
