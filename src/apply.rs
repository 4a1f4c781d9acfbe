//! Transactional application of a reconciliation diff

use crate::error::StoreError;
use crate::reconcile::Diff;
use crate::store::UnitOfWork;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Ids touched by one committed diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub created_ids: Vec<String>,
    pub updated_ids: Vec<String>,
    pub archived_ids: Vec<String>,
}

/// Write creates, then retargets, then archives, then bump the goal; commit
/// only if every step succeeded.
pub fn apply<U: UnitOfWork>(
    mut uow: U,
    goal_id: &str,
    diff: &Diff,
    now: DateTime<Utc>,
) -> Result<ApplyResult, StoreError> {
    match write_all(&mut uow, goal_id, diff, now) {
        Ok(result) => {
            uow.commit()?;
            debug!(
                "Applied diff to goal {}: {} created, {} updated, {} archived",
                goal_id,
                result.created_ids.len(),
                result.updated_ids.len(),
                result.archived_ids.len()
            );
            Ok(result)
        }
        Err(e) => {
            warn!("Rolling back diff for goal {}: {}", goal_id, e);
            if let Err(rollback_err) = uow.rollback() {
                warn!("Rollback for goal {} failed: {}", goal_id, rollback_err);
            }
            Err(e)
        }
    }
}

fn write_all<U: UnitOfWork>(
    uow: &mut U,
    goal_id: &str,
    diff: &Diff,
    now: DateTime<Utc>,
) -> Result<ApplyResult, StoreError> {
    let mut result = ApplyResult::default();

    for draft in &diff.to_create {
        result.created_ids.push(uow.create_task(draft, now)?);
    }

    for retarget in &diff.to_retarget {
        uow.retarget_task(goal_id, retarget, now)?;
        result.updated_ids.push(retarget.task_id.clone());
    }

    uow.archive_tasks(goal_id, &diff.to_archive, now)?;
    result.archived_ids = diff.to_archive.clone();

    uow.touch_goal(goal_id, now)?;
    Ok(result)
}
