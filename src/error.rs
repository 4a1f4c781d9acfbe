use std::path::PathBuf;
use thiserror::Error;

use crate::worker::JobStage;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Unknown value '{value}' in column {column}")]
    Decode { column: &'static str, value: String },

    #[error("Task {0} is not an active pending task of this goal")]
    StaleTask(String),

    #[error("Goal {0} not found")]
    GoalNotFound(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to encode job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Corrupt job row: {0}")]
    Corrupt(String),

    #[error("Job {id} is {state}, expected {expected}")]
    WrongState {
        id: String,
        state: String,
        expected: &'static str,
    },

    /// The job was redelivered after this delivery claimed it
    #[error("Job {id} delivery {delivery} no longer holds the job (now on delivery {current})")]
    LeaseLost {
        id: String,
        delivery: u32,
        current: u32,
    },
}

impl QueueError {
    /// Whether repeating the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Database(_))
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Malformed oracle output: {0}")]
    Malformed(String),

    #[error("Oracle returned an empty plan")]
    EmptyPlan,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint {url} rejected notification with status {status}")]
    Rejected { url: String, status: u16 },
}

/// Whether the queue should redeliver a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fatal,
    Retryable,
}

#[derive(Error, Debug)]
pub enum JobErrorKind {
    #[error("Invalid job: {0}")]
    Invalid(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
}

#[derive(Error, Debug)]
#[error("job failed while {stage}: {kind}")]
pub struct JobError {
    pub stage: JobStage,
    #[source]
    pub kind: JobErrorKind,
}

impl JobError {
    pub fn new(stage: JobStage, kind: impl Into<JobErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    pub fn invalid(stage: JobStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind: JobErrorKind::Invalid(reason.into()),
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match &self.kind {
            JobErrorKind::Invalid(_) => FailureKind::Fatal,
            JobErrorKind::Store(StoreError::GoalNotFound(_)) => FailureKind::Fatal,
            JobErrorKind::Store(_) | JobErrorKind::Oracle(_) => FailureKind::Retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_job_is_fatal() {
        let err = JobError::invalid(JobStage::FetchingState, "goal owned by someone else");
        assert_eq!(err.failure_kind(), FailureKind::Fatal);

        let err = JobError::new(
            JobStage::FetchingState,
            StoreError::GoalNotFound("g1".to_string()),
        );
        assert_eq!(err.failure_kind(), FailureKind::Fatal);
    }

    #[test]
    fn test_oracle_and_store_failures_are_retryable() {
        let err = JobError::new(JobStage::AwaitingOracle, OracleError::EmptyPlan);
        assert_eq!(err.failure_kind(), FailureKind::Retryable);

        let err = JobError::new(
            JobStage::Applying,
            StoreError::StaleTask("t1".to_string()),
        );
        assert_eq!(err.failure_kind(), FailureKind::Retryable);
        assert!(err.to_string().contains("applying"));
    }
}
