use super::PlanningOracle;
use crate::error::OracleError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str =
    "You are a planning assistant. Answer with JSON only, without commentary.";

/// OpenAI-compatible `/chat/completions` client
pub struct OpenAiHttpOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
}

impl OpenAiHttpOracle {
    pub fn new(base_url: String, model: String, api_key_env: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            api_key_env,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl PlanningOracle for OpenAiHttpOracle {
    fn name(&self) -> &'static str {
        "openai_http"
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| OracleError::MissingApiKey(self.api_key_env.clone()))?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        debug!("POST {} ({} byte prompt)", self.endpoint(), prompt.len());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(timeout)
                } else {
                    OracleError::Http(e)
                }
            })?
            .error_for_status()?;

        let chat: ChatResponse = response.json().await?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("completion had no message content".to_string()))
    }
}
