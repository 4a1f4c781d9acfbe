//! Planning oracle boundary: prompt in, day-by-day plan out
//!
//! The oracle is an opaque text-completion service. Everything it returns is
//! treated as untrusted and goes through [`parse_plan`] before the
//! reconciliation engine sees it.

mod claude;
mod openai;
mod parser;
mod prompt;

pub use claude::ClaudeCliOracle;
pub use openai::OpenAiHttpOracle;
pub use parser::{parse_plan, ProposedPlanItem};
pub use prompt::build_prompt;

use crate::config::{OracleConfig, OracleProvider};
use crate::error::OracleError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait PlanningOracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send a prompt and return the raw completion text
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError>;
}

/// Create the oracle client the config selects
pub fn create_oracle(config: &OracleConfig) -> Arc<dyn PlanningOracle> {
    match config.provider {
        OracleProvider::ClaudeCli => Arc::new(ClaudeCliOracle {
            binary: config.claude_cli.binary.clone(),
            model: config.claude_cli.model.clone(),
        }),
        OracleProvider::OpenaiHttp => Arc::new(OpenAiHttpOracle::new(
            config.openai_http.base_url.clone(),
            config.openai_http.model.clone(),
            config.openai_http.api_key_env.clone(),
        )),
    }
}
