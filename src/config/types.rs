use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    /// SQLite database holding goals, tasks and the job queue
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Maximum jobs processed at once (never more than one per goal)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Active jobs locked longer than this are considered crashed and requeued
    #[serde(default = "default_stall_timeout_sec")]
    pub stall_timeout_sec: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Redelivery policy, copied onto every job at enqueue time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    #[default]
    ClaudeCli,
    OpenaiHttp,
}

impl std::fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleProvider::ClaudeCli => write!(f, "claude_cli"),
            OracleProvider::OpenaiHttp => write!(f, "openai_http"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OracleConfig {
    #[serde(default)]
    pub provider: OracleProvider,

    #[serde(default = "default_oracle_timeout_sec")]
    pub timeout_sec: u64,

    #[serde(default)]
    pub claude_cli: ClaudeCliConfig,

    #[serde(default)]
    pub openai_http: OpenAiHttpConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::default(),
            timeout_sec: default_oracle_timeout_sec(),
            claude_cli: ClaudeCliConfig::default(),
            openai_http: OpenAiHttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClaudeCliConfig {
    #[serde(default = "default_claude_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_claude_model")]
    pub model: String,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: default_claude_binary(),
            model: default_claude_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OpenAiHttpConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,
}

impl Default for OpenAiHttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct NotifyConfig {
    /// Real-time event endpoint; events are only logged when unset
    #[serde(default)]
    pub event_url: Option<String>,

    /// Mail relay endpoint; emails are only logged when unset
    #[serde(default)]
    pub email_url: Option<String>,

    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    #[serde(default = "default_notify_timeout_sec")]
    pub timeout_sec: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            event_url: None,
            email_url: None,
            dashboard_url: default_dashboard_url(),
            timeout_sec: default_notify_timeout_sec(),
        }
    }
}
