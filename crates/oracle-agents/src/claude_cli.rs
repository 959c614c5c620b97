use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// How to reach the `claude` CLI and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub binary: String,
    pub model: String,
    pub timeout: Duration,
}

impl ClaudeCliConfig {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            timeout,
            ..Self::default()
        }
    }
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Run the CLI once in print mode and return its stdout.
///
/// The whole call, including process start-up, is bounded by
/// `config.timeout`; the child is killed if the deadline passes.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, binary = %config.binary, "Invoking claude CLI");

    let output = tokio::time::timeout(config.timeout, async {
        Command::new(&config.binary)
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.binary)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "{} exited {}: {}",
            config.binary,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli("Claude returned empty response".to_string()));
    }

    Ok(stdout)
}

/// Whether `binary --version` runs successfully.
pub async fn check_cli_available(binary: &str) -> bool {
    match Command::new(binary).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_new_keeps_default_binary() {
        let config = ClaudeCliConfig::new("claude-sonnet-4-5", Duration::from_secs(10));
        assert_eq!(config.binary, "claude");
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_binary_is_a_cli_error() {
        let config = ClaudeCliConfig {
            binary: "oracle-test-no-such-binary".to_string(),
            ..ClaudeCliConfig::default()
        };
        let err = invoke_claude("system", "user", &config).await.unwrap_err();
        assert!(matches!(err, AgentError::Cli(msg) if msg.contains("Failed to spawn")));
        assert!(!check_cli_available(&config.binary).await);
    }
}
