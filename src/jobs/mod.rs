//! Job contracts and the durable queue that carries them
//!
//! A job is one reconciliation + apply cycle for one goal. `generate` jobs are
//! fired when a goal is created, `adapt` jobs whenever its schedule is
//! perturbed afterwards. Payloads are serialized with a `kind` tag and
//! camelCase fields, matching what the web tier enqueues.

mod queue;
mod retry;

pub use queue::{EnqueueOutcome, JobQueue, Redelivery, SqliteQueue};
pub use retry::{backoff_delay, retry_with_backoff};

use crate::config::RetryConfig;
use crate::model::SkillLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdaptationJob {
    Generate(GeneratePayload),
    Adapt(AdaptPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePayload {
    pub goal_id: String,
    pub user_id: String,
    pub goal_name: String,
    pub duration_days: u32,
    pub time_per_day_hours: f64,
    pub skill_level: SkillLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptPayload {
    pub goal_id: String,
    pub trigger: AdaptTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum AdaptTrigger {
    TaskCompleted,
    TaskRescheduled,
    TaskSkipped,
    ManualTrigger,
}

impl AdaptTrigger {
    pub fn describe(&self) -> &'static str {
        match self {
            AdaptTrigger::TaskCompleted => "a task was completed",
            AdaptTrigger::TaskRescheduled => "a task was rescheduled",
            AdaptTrigger::TaskSkipped => "a task was skipped",
            AdaptTrigger::ManualTrigger => "the user asked for a new plan",
        }
    }
}

impl AdaptationJob {
    pub fn goal_id(&self) -> &str {
        match self {
            AdaptationJob::Generate(p) => &p.goal_id,
            AdaptationJob::Adapt(p) => &p.goal_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdaptationJob::Generate(_) => "generate",
            AdaptationJob::Adapt(_) => "adapt",
        }
    }

    /// The user the payload names explicitly, if any
    pub fn claimed_user(&self) -> Option<&str> {
        match self {
            AdaptationJob::Generate(p) => Some(&p.user_id),
            AdaptationJob::Adapt(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    /// Invalid payload, dropped without retry
    Discarded,
    /// Retries exhausted, waiting for an operator
    Parked,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Discarded => "discarded",
            JobState::Parked => "parked",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "discarded" => Ok(JobState::Discarded),
            "parked" => Ok(JobState::Parked),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// A job as stored in the queue
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub job: AdaptationJob,
    pub state: JobState,
    /// Deliveries counted against the retry budget, including the current one
    pub attempts: u32,
    /// Claim counter; never reset, so each delivery has its own value
    pub delivery: u32,
    pub retry: RetryConfig,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn goal_id(&self) -> &str {
        self.job.goal_id()
    }
}
