use super::PlanningOracle;
use crate::error::OracleError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

/// Runs the Claude CLI in print mode with JSON output
pub struct ClaudeCliOracle {
    pub binary: PathBuf,
    pub model: String,
}

#[async_trait]
impl PlanningOracle for ClaudeCliOracle {
    fn name(&self) -> &'static str {
        "claude_cli"
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError> {
        // Build command - use string for PATH lookup if not an absolute/relative path
        let binary_str = self.binary.to_string_lossy();
        let mut cmd = if binary_str.contains('/') || binary_str.contains('\\') {
            Command::new(&self.binary)
        } else {
            Command::new(binary_str.as_ref())
        };

        cmd.arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(&self.model)
            .arg("--output-format")
            .arg("json")
            .kill_on_drop(true);

        let start = std::time::Instant::now();

        let output = tokio_timeout(timeout, cmd.output())
            .await
            .map_err(|_| OracleError::Timeout(timeout))?
            .map_err(OracleError::Io)?;

        debug!("claude_cli responded in {:?}", start.elapsed());

        if !output.status.success() {
            return Err(OracleError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
