pub mod analyst;
pub mod claude_cli;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod prompts;

pub mod test_support;

pub use analyst::{
    Analyst, AnalystPrediction, ClaudeAnalyst, ClaudeHeadlineFilter, HeadlineFilter, HeadlineSource,
};
pub use error::AgentError;
pub use orchestrator::{AnalystOutcome, Orchestrator};
