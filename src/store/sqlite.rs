use super::{TaskStore, UnitOfWork};
use crate::apply::{self, ApplyResult};
use crate::db::Db;
use crate::error::StoreError;
use crate::model::{Goal, Task, TaskDraft};
use crate::reconcile::{Diff, Retarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, ToSql, Transaction,
};
use std::str::FromStr;
use uuid::Uuid;

const GOAL_COLUMNS: &str = "id, user_id, title, duration_days, time_per_day_hours, skill_level, \
    target_date, status, created_at, updated_at";

const TASK_COLUMNS: &str = "id, user_id, goal_id, title, description, status, due_date, \
    order_index, is_archived, created_at, updated_at";

/// Statuses the engine is allowed to rewrite
const OPEN_STATUSES: &str = "('pending', 'overdue')";

fn parse_column<T>(column: &'static str, value: String) -> Result<T, StoreError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|_| StoreError::Decode { column, value })
}

struct GoalRow {
    id: String,
    user_id: String,
    title: String,
    duration_days: u32,
    time_per_day_hours: f64,
    skill_level: String,
    target_date: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GoalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            duration_days: row.get(3)?,
            time_per_day_hours: row.get(4)?,
            skill_level: row.get(5)?,
            target_date: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_goal(self) -> Result<Goal, StoreError> {
        Ok(Goal {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            duration_days: self.duration_days,
            time_per_day_hours: self.time_per_day_hours,
            skill_level: parse_column("goals.skill_level", self.skill_level)?,
            target_date: self.target_date,
            status: parse_column("goals.status", self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct TaskRow {
    id: String,
    user_id: String,
    goal_id: Option<String>,
    title: String,
    description: Option<String>,
    status: String,
    due_date: Option<DateTime<Utc>>,
    order_index: i64,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            goal_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            due_date: row.get(6)?,
            order_index: row.get(7)?,
            is_archived: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_task(self) -> Result<Task, StoreError> {
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            goal_id: self.goal_id,
            title: self.title,
            description: self.description,
            status: parse_column("tasks.status", self.status)?,
            due_date: self.due_date,
            order_index: self.order_index,
            is_archived: self.is_archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn load_goal(conn: &Connection, goal_id: &str) -> Result<Option<Goal>, StoreError> {
    let sql = format!("SELECT {} FROM goals WHERE id = ?1", GOAL_COLUMNS);
    conn.query_row(&sql, params![goal_id], GoalRow::from_row)
        .optional()?
        .map(GoalRow::into_goal)
        .transpose()
}

pub(crate) fn load_goal_tasks(conn: &Connection, goal_id: &str) -> Result<Vec<Task>, StoreError> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE goal_id = ?1 AND is_archived = 0 \
         ORDER BY order_index, created_at, id",
        TASK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![goal_id], TaskRow::from_row)?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?.into_task()?);
    }
    Ok(tasks)
}

pub(crate) fn upsert_goal(conn: &Connection, goal: &Goal) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO goals (id, user_id, title, duration_days, time_per_day_hours, \
         skill_level, target_date, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            goal.id,
            goal.user_id,
            goal.title,
            goal.duration_days,
            goal.time_per_day_hours,
            goal.skill_level.as_str(),
            goal.target_date,
            goal.status.as_str(),
            goal.created_at,
            goal.updated_at
        ],
    )?;
    Ok(())
}

pub(crate) fn upsert_task(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO tasks (id, user_id, goal_id, title, description, status, \
         due_date, order_index, is_archived, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            task.id,
            task.user_id,
            task.goal_id,
            task.title,
            task.description,
            task.status.as_str(),
            task.due_date,
            task.order_index,
            task.is_archived,
            task.created_at,
            task.updated_at
        ],
    )?;
    Ok(())
}

/// SQLite-backed goals and tasks
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn upsert_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        let conn = self.db.lock().await;
        upsert_goal(&conn, goal)
    }

    pub async fn upsert_task(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.db.lock().await;
        upsert_task(&conn, task)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn goal(&self, goal_id: &str) -> Result<Option<Goal>, StoreError> {
        let conn = self.db.lock().await;
        load_goal(&conn, goal_id)
    }

    async fn goal_tasks(&self, goal_id: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.db.lock().await;
        load_goal_tasks(&conn, goal_id)
    }

    async fn apply_diff(&self, goal_id: &str, diff: &Diff) -> Result<ApplyResult, StoreError> {
        let mut conn = self.db.lock().await;
        let uow = SqliteUnitOfWork::begin(&mut conn)?;
        apply::apply(uow, goal_id, diff, Utc::now())
    }
}

/// A rusqlite transaction; rolls back when dropped uncommitted
pub struct SqliteUnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> SqliteUnitOfWork<'conn> {
    pub fn begin(conn: &'conn mut Connection) -> Result<Self, StoreError> {
        Ok(Self {
            tx: conn.transaction()?,
        })
    }
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn create_task(&mut self, draft: &TaskDraft, now: DateTime<Utc>) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO tasks (id, user_id, goal_id, title, description, status, due_date, \
             order_index, is_archived, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
        )?;
        stmt.execute(params![
            id,
            draft.user_id,
            draft.goal_id,
            draft.title,
            draft.description,
            draft.status.as_str(),
            draft.due_date,
            draft.order_index,
            now
        ])?;
        Ok(id)
    }

    fn retarget_task(
        &mut self,
        goal_id: &str,
        retarget: &Retarget,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE tasks SET title = ?1, due_date = ?2, updated_at = ?3 \
             WHERE id = ?4 AND goal_id = ?5 AND is_archived = 0 AND status IN {}",
            OPEN_STATUSES
        );
        let changed = self.tx.execute(
            &sql,
            params![
                retarget.title,
                retarget.due_date,
                now,
                retarget.task_id,
                goal_id
            ],
        )?;
        if changed != 1 {
            return Err(StoreError::StaleTask(retarget.task_id.clone()));
        }
        Ok(())
    }

    fn archive_tasks(
        &mut self,
        goal_id: &str,
        task_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if task_ids.is_empty() {
            return Ok(());
        }

        let placeholders = (0..task_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE tasks SET is_archived = 1, updated_at = ?1 \
             WHERE goal_id = ?2 AND is_archived = 0 AND status IN {} AND id IN ({})",
            OPEN_STATUSES, placeholders
        );

        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(task_ids.len() + 2);
        values.push(&now);
        values.push(&goal_id);
        values.extend(task_ids.iter().map(|id| id as &dyn ToSql));

        let changed = self.tx.execute(&sql, params_from_iter(values))?;
        if changed != task_ids.len() {
            return Err(StoreError::StaleTask(task_ids.join(", ")));
        }
        Ok(())
    }

    fn touch_goal(&mut self, goal_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let changed = self.tx.execute(
            "UPDATE goals SET updated_at = ?1 WHERE id = ?2",
            params![now, goal_id],
        )?;
        if changed != 1 {
            return Err(StoreError::GoalNotFound(goal_id.to_string()));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback()?;
        Ok(())
    }
}
