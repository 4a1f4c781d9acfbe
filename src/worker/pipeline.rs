use super::{GoalLocks, JobStage};
use crate::apply::ApplyResult;
use crate::config::Config;
use crate::error::{JobError, OracleError, StoreError};
use crate::jobs::{AdaptationJob, JobRecord};
use crate::model::{GoalStatus, TaskSnapshot};
use crate::notify::{self, Notifier};
use crate::oracle::{build_prompt, parse_plan, PlanningOracle};
use crate::reconcile::reconcile;
use crate::store::TaskStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Applied(ApplyResult),
    /// Nothing to write: no proposed work and no pending tasks
    NoOp,
}

/// One adaptation cycle: fetch, ask the oracle, reconcile, apply, notify
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn TaskStore>,
    oracle: Arc<dyn PlanningOracle>,
    notifier: Arc<dyn Notifier>,
    locks: GoalLocks,
    oracle_timeout: Duration,
    dashboard_url: String,
}

fn enter(job_id: &str, stage: JobStage) -> JobStage {
    debug!("Job {} -> {}", job_id, stage);
    stage
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TaskStore>,
        oracle: Arc<dyn PlanningOracle>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            oracle,
            notifier,
            locks: GoalLocks::new(),
            oracle_timeout: config.oracle_timeout(),
            dashboard_url: config.notify.dashboard_url.clone(),
        }
    }

    pub async fn process(&self, record: &JobRecord) -> Result<JobOutcome, JobError> {
        let job_id = record.id.as_str();
        let goal_id = record.goal_id();
        enter(job_id, JobStage::Received);

        let guard = self.locks.lock(goal_id).await;

        let stage = enter(job_id, JobStage::FetchingState);
        let goal = self
            .store
            .goal(goal_id)
            .await
            .map_err(|e| JobError::new(stage, e))?
            .ok_or_else(|| JobError::new(stage, StoreError::GoalNotFound(goal_id.to_string())))?;

        if let Some(user_id) = record.job.claimed_user() {
            if user_id != goal.user_id {
                return Err(JobError::invalid(
                    stage,
                    format!("goal {} is not owned by user {}", goal_id, user_id),
                ));
            }
        }
        if goal.status != GoalStatus::Active {
            return Err(JobError::invalid(
                stage,
                format!("goal {} is {}", goal_id, goal.status.as_str()),
            ));
        }

        let tasks = self
            .store
            .goal_tasks(goal_id)
            .await
            .map_err(|e| JobError::new(stage, e))?;
        let snapshot = TaskSnapshot::from_tasks(tasks);

        let stage = enter(job_id, JobStage::AwaitingOracle);
        let now = Utc::now();
        let prompt = build_prompt(&goal, &snapshot, &record.job, now);
        let raw = tokio::time::timeout(
            self.oracle_timeout,
            self.oracle.complete(&prompt, self.oracle_timeout),
        )
        .await
        .unwrap_or_else(|_| Err(OracleError::Timeout(self.oracle_timeout)))
        .map_err(|e| JobError::new(stage, e))?;

        let plan = match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(OracleError::EmptyPlan) if snapshot.pending.is_empty() => {
                info!("Job {}: empty plan and no pending work for goal {}", job_id, goal_id);
                return Ok(JobOutcome::NoOp);
            }
            Err(e) => return Err(JobError::new(stage, e)),
        };

        enter(job_id, JobStage::Reconciling);
        let reference_start = match &record.job {
            AdaptationJob::Generate(_) => goal.created_at,
            AdaptationJob::Adapt(_) => now,
        };
        let diff = reconcile(
            &goal,
            &snapshot.completed,
            &snapshot.pending,
            &plan,
            reference_start,
        );

        let stage = enter(job_id, JobStage::Applying);
        let result = self
            .store
            .apply_diff(goal_id, &diff)
            .await
            .map_err(|e| JobError::new(stage, e))?;
        drop(guard);

        enter(job_id, JobStage::Notifying);
        notify::fan_out(self.notifier.as_ref(), &goal, &result, &self.dashboard_url).await;

        enter(job_id, JobStage::Completed);
        Ok(JobOutcome::Applied(result))
    }
}
