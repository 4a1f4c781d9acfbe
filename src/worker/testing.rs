//! Doubles shared by the pipeline and worker tests

use crate::config::RetryConfig;
use crate::error::{NotifyError, OracleError};
use crate::jobs::{AdaptPayload, AdaptTrigger, AdaptationJob, GeneratePayload, JobRecord, JobState};
use crate::model::SkillLevel;
use crate::notify::{EmailMessage, Notification, Notifier};
use crate::oracle::PlanningOracle;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns the same completion for every prompt, optionally after a delay
pub struct ScriptedOracle {
    response: Result<String, String>,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn always(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(stderr.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(response: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response.to_string()),
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlanningOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _timeout: Duration) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .clone()
            .map_err(|stderr| OracleError::NonZeroExit { code: 1, stderr })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(String, Notification)>>,
    emails: Mutex<Vec<(String, EmailMessage)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(String, Notification)> {
        self.events.lock().unwrap().clone()
    }

    pub fn emails(&self) -> Vec<(String, EmailMessage)> {
        self.emails.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Rejected {
                url: "http://notify.invalid".to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.check()?;
        self.events
            .lock()
            .unwrap()
            .push((user_id.to_string(), notification.clone()));
        Ok(())
    }

    async fn email(&self, user_id: &str, message: &EmailMessage) -> Result<(), NotifyError> {
        self.check()?;
        self.emails
            .lock()
            .unwrap()
            .push((user_id.to_string(), message.clone()));
        Ok(())
    }
}

pub fn adapt(goal_id: &str) -> AdaptationJob {
    AdaptationJob::Adapt(AdaptPayload {
        goal_id: goal_id.to_string(),
        trigger: AdaptTrigger::TaskCompleted,
    })
}

pub fn generate(goal_id: &str, user_id: &str) -> AdaptationJob {
    AdaptationJob::Generate(GeneratePayload {
        goal_id: goal_id.to_string(),
        user_id: user_id.to_string(),
        goal_name: "Learn Guitar".to_string(),
        duration_days: 28,
        time_per_day_hours: 1.0,
        skill_level: SkillLevel::Beginner,
    })
}

pub fn record(job: AdaptationJob) -> JobRecord {
    let now = Utc::now();
    JobRecord {
        id: "job-1".to_string(),
        job,
        state: JobState::Active,
        attempts: 1,
        delivery: 1,
        retry: RetryConfig::default(),
        run_at: now,
        locked_at: Some(now),
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}
