//! Task store boundary and the unit of work the applier writes through

mod sqlite;

pub use sqlite::SqliteStore;

#[cfg(test)]
pub(crate) use sqlite::{fixtures, upsert_goal, upsert_task, SqliteUnitOfWork};

use crate::apply::ApplyResult;
use crate::error::StoreError;
use crate::model::{Goal, Task, TaskDraft};
use crate::reconcile::{Diff, Retarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn goal(&self, goal_id: &str) -> Result<Option<Goal>, StoreError>;

    /// Non-archived tasks of a goal, in display order
    async fn goal_tasks(&self, goal_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Commit a whole diff in one transaction, or nothing at all
    async fn apply_diff(&self, goal_id: &str, diff: &Diff) -> Result<ApplyResult, StoreError>;
}

/// One open transaction against the task store.
///
/// Writes are only visible to other readers after [`UnitOfWork::commit`].
/// Dropping a unit of work without committing discards its writes.
pub trait UnitOfWork {
    fn create_task(&mut self, draft: &TaskDraft, now: DateTime<Utc>) -> Result<String, StoreError>;

    /// Fails with [`StoreError::StaleTask`] if the task is no longer open work of the goal
    fn retarget_task(
        &mut self,
        goal_id: &str,
        retarget: &Retarget,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Fails with [`StoreError::StaleTask`] if any task is no longer open work of the goal
    fn archive_tasks(
        &mut self,
        goal_id: &str,
        task_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn touch_goal(&mut self, goal_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}
