use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_database() -> PathBuf {
    PathBuf::from("goalplan.db")
}

pub fn default_concurrency() -> usize {
    4
}

pub fn default_poll_interval_ms() -> u64 {
    1000
}

pub fn default_stall_timeout_sec() -> u64 {
    600
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn default_backoff_max_ms() -> u64 {
    5 * 60 * 1000
}

pub fn default_oracle_timeout_sec() -> u64 {
    120
}

pub fn default_claude_binary() -> PathBuf {
    // Check common install location first
    if let Some(home) = std::env::var_os("HOME") {
        let local_path = PathBuf::from(home).join(".claude/local/claude");
        if local_path.exists() {
            return local_path;
        }
    }
    PathBuf::from("claude")
}

pub fn default_claude_model() -> String {
    "sonnet".to_string()
}

pub fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

pub fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

pub fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

pub fn default_dashboard_url() -> String {
    "http://localhost:3000/dashboard".to_string()
}

pub fn default_notify_timeout_sec() -> u64 {
    10
}
