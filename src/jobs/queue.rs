use super::{backoff_delay, AdaptationJob, JobRecord, JobState};
use crate::config::RetryConfig;
use crate::db::Db;
use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(String),
    /// Folded into a job of the same kind already waiting for this goal
    Coalesced(String),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            EnqueueOutcome::Enqueued(id) | EnqueueOutcome::Coalesced(id) => id,
        }
    }
}

/// What happened to a job reported as failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redelivery {
    RetryAt(DateTime<Utc>),
    Parked,
}

/// Durable at-least-once job queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        job: &AdaptationJob,
        retry: &RetryConfig,
    ) -> Result<EnqueueOutcome, QueueError>;

    /// Claim the next runnable job. Never returns a job whose goal already
    /// has an active job.
    async fn dequeue(&self) -> Result<Option<JobRecord>, QueueError>;

    /// Acknowledgements name the delivery they report on. Only the delivery
    /// that currently holds the job may settle it; anything else gets
    /// `LeaseLost`.
    async fn complete(&self, id: &str, delivery: u32) -> Result<(), QueueError>;

    /// Drop a job whose payload can never succeed
    async fn discard(&self, id: &str, delivery: u32, reason: &str) -> Result<(), QueueError>;

    /// Schedule a retry with backoff, or park the job once attempts run out
    async fn fail(&self, id: &str, delivery: u32, error: &str) -> Result<Redelivery, QueueError>;

    /// Return jobs locked for longer than `older_than` to the queue
    async fn requeue_stalled(&self, older_than: Duration) -> Result<usize, QueueError>;

    async fn list(&self, state: Option<JobState>) -> Result<Vec<JobRecord>, QueueError>;

    /// Put a parked job back in the queue with a fresh attempt budget
    async fn revive(&self, id: &str) -> Result<(), QueueError>;
}

pub struct SqliteQueue {
    db: Db,
}

const JOB_COLUMNS: &str = "id, payload, state, attempts, delivery, max_attempts, \
    backoff_base_ms, backoff_max_ms, run_at, locked_at, last_error, created_at, updated_at";

struct JobRow {
    id: String,
    payload: String,
    state: String,
    attempts: u32,
    delivery: u32,
    max_attempts: u32,
    backoff_base_ms: i64,
    backoff_max_ms: i64,
    run_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            payload: row.get(1)?,
            state: row.get(2)?,
            attempts: row.get(3)?,
            delivery: row.get(4)?,
            max_attempts: row.get(5)?,
            backoff_base_ms: row.get(6)?,
            backoff_max_ms: row.get(7)?,
            run_at: row.get(8)?,
            locked_at: row.get(9)?,
            last_error: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<JobRecord, QueueError> {
        let job: AdaptationJob = serde_json::from_str(&self.payload)?;
        let state = self
            .state
            .parse::<JobState>()
            .map_err(|e| QueueError::Corrupt(format!("job {}: {}", self.id, e)))?;

        Ok(JobRecord {
            id: self.id,
            job,
            state,
            attempts: self.attempts,
            delivery: self.delivery,
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                backoff_base_ms: u64::try_from(self.backoff_base_ms).unwrap_or(0),
                backoff_max_ms: u64::try_from(self.backoff_max_ms).unwrap_or(0),
            },
            run_at: self.run_at,
            locked_at: self.locked_at,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

impl SqliteQueue {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn load(conn: &rusqlite::Connection, id: &str) -> Result<JobRecord, QueueError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        conn.query_row(&sql, params![id], JobRow::from_row)
            .optional()?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?
            .into_record()
    }

    /// Load a job that `delivery` still holds
    fn claimed(
        conn: &rusqlite::Connection,
        id: &str,
        delivery: u32,
    ) -> Result<JobRecord, QueueError> {
        let record = Self::load(conn, id)?;
        Self::expect_state(&record, JobState::Active)?;
        if record.delivery != delivery {
            return Err(QueueError::LeaseLost {
                id: record.id,
                delivery,
                current: record.delivery,
            });
        }
        Ok(record)
    }

    /// Run a guarded acknowledgement update. It only lands while `delivery`
    /// still holds the job.
    fn settle(
        tx: &rusqlite::Transaction<'_>,
        id: &str,
        delivery: u32,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<(), QueueError> {
        if tx.execute(sql, params)? == 0 {
            // Explain why the guarded update missed
            Self::claimed(tx, id, delivery)?;
        }
        Ok(())
    }

    fn expect_state(record: &JobRecord, expected: JobState) -> Result<(), QueueError> {
        if record.state != expected {
            return Err(QueueError::WrongState {
                id: record.id.clone(),
                state: record.state.to_string(),
                expected: expected.as_str(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(
        &self,
        job: &AdaptationJob,
        retry: &RetryConfig,
    ) -> Result<EnqueueOutcome, QueueError> {
        let payload = serde_json::to_string(job)?;
        let now = Utc::now();

        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let waiting: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs WHERE goal_id = ?1 AND kind = ?2 AND state = 'queued' \
                 ORDER BY created_at LIMIT 1",
                params![job.goal_id(), job.kind()],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match waiting {
            Some(id) => {
                // Keep the latest payload so the run reflects the newest trigger.
                // A fresh trigger also gets a fresh attempt budget, even when the
                // waiting job is backing off from an earlier failure.
                tx.execute(
                    "UPDATE jobs SET payload = ?1, attempts = 0, max_attempts = ?2, \
                     backoff_base_ms = ?3, backoff_max_ms = ?4, run_at = ?5, last_error = NULL, \
                     updated_at = ?5 WHERE id = ?6",
                    params![
                        payload,
                        retry.max_attempts,
                        millis(retry.backoff_base_ms),
                        millis(retry.backoff_max_ms),
                        now,
                        id
                    ],
                )?;
                EnqueueOutcome::Coalesced(id)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO jobs (id, goal_id, kind, payload, state, attempts, max_attempts, \
                     backoff_base_ms, backoff_max_ms, run_at, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?6, ?7, ?8, ?8, ?8)",
                    params![
                        id,
                        job.goal_id(),
                        job.kind(),
                        payload,
                        retry.max_attempts,
                        millis(retry.backoff_base_ms),
                        millis(retry.backoff_max_ms),
                        now
                    ],
                )?;
                EnqueueOutcome::Enqueued(id)
            }
        };

        tx.commit()?;

        debug!(
            "{} job for goal {}: {:?}",
            job.kind(),
            job.goal_id(),
            outcome
        );
        Ok(outcome)
    }

    async fn dequeue(&self) -> Result<Option<JobRecord>, QueueError> {
        let now = Utc::now();
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let next: Option<String> = tx
            .query_row(
                "SELECT j.id FROM jobs j \
                 WHERE j.state = 'queued' AND j.run_at <= ?1 \
                 AND NOT EXISTS ( \
                     SELECT 1 FROM jobs a WHERE a.goal_id = j.goal_id AND a.state = 'active' \
                 ) \
                 ORDER BY j.run_at, j.created_at, j.rowid LIMIT 1",
                params![now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = next else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET state = 'active', attempts = attempts + 1, delivery = delivery + 1, \
             locked_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        let record = Self::load(&tx, &id)?;
        tx.commit()?;

        Ok(Some(record))
    }

    async fn complete(&self, id: &str, delivery: u32) -> Result<(), QueueError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        Self::settle(
            &tx,
            id,
            delivery,
            "UPDATE jobs SET state = 'completed', locked_at = NULL, last_error = NULL, \
             updated_at = ?1 WHERE id = ?2 AND state = 'active' AND delivery = ?3",
            params![Utc::now(), id, delivery],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn discard(&self, id: &str, delivery: u32, reason: &str) -> Result<(), QueueError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        Self::settle(
            &tx,
            id,
            delivery,
            "UPDATE jobs SET state = 'discarded', locked_at = NULL, last_error = ?1, \
             updated_at = ?2 WHERE id = ?3 AND state = 'active' AND delivery = ?4",
            params![reason, Utc::now(), id, delivery],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn fail(&self, id: &str, delivery: u32, error: &str) -> Result<Redelivery, QueueError> {
        let now = Utc::now();
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;
        let record = Self::claimed(&tx, id, delivery)?;

        if record.attempts >= record.retry.max_attempts {
            Self::settle(
                &tx,
                id,
                delivery,
                "UPDATE jobs SET state = 'parked', locked_at = NULL, last_error = ?1, \
                 updated_at = ?2 WHERE id = ?3 AND state = 'active' AND delivery = ?4",
                params![error, now, id, delivery],
            )?;
            tx.commit()?;
            warn!(
                "Job {} parked after {} attempts: {}",
                id, record.attempts, error
            );
            return Ok(Redelivery::Parked);
        }

        let delay = backoff_delay(&record.retry, record.attempts);
        let run_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        Self::settle(
            &tx,
            id,
            delivery,
            "UPDATE jobs SET state = 'queued', locked_at = NULL, last_error = ?1, run_at = ?2, \
             updated_at = ?3 WHERE id = ?4 AND state = 'active' AND delivery = ?5",
            params![error, run_at, now, id, delivery],
        )?;
        tx.commit()?;
        Ok(Redelivery::RetryAt(run_at))
    }

    async fn requeue_stalled(&self, older_than: Duration) -> Result<usize, QueueError> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        // A job that keeps crashing its worker must not loop forever
        let parked = tx.execute(
            "UPDATE jobs SET state = 'parked', locked_at = NULL, updated_at = ?1, \
             last_error = 'stalled: worker stopped responding' \
             WHERE state = 'active' AND locked_at <= ?2 AND attempts >= max_attempts",
            params![now, cutoff],
        )?;
        let count = tx.execute(
            "UPDATE jobs SET state = 'queued', locked_at = NULL, run_at = ?1, updated_at = ?1, \
             last_error = 'stalled: worker stopped responding' \
             WHERE state = 'active' AND locked_at <= ?2",
            params![now, cutoff],
        )?;
        tx.commit()?;

        if parked > 0 {
            warn!("Parked {} stalled jobs with no attempts left", parked);
        }
        if count > 0 {
            info!("Requeued {} stalled jobs", count);
        }
        Ok(count)
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<JobRecord>, QueueError> {
        let conn = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM jobs WHERE (?1 IS NULL OR state = ?1) ORDER BY created_at, rowid",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![state.map(|s| s.as_str())], JobRow::from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.into_record()?);
        }
        Ok(results)
    }

    async fn revive(&self, id: &str) -> Result<(), QueueError> {
        let conn = self.db.lock().await;
        let record = Self::load(&conn, id)?;
        Self::expect_state(&record, JobState::Parked)?;

        let now = Utc::now();
        conn.execute(
            "UPDATE jobs SET state = 'queued', attempts = 0, run_at = ?1, updated_at = ?1 \
             WHERE id = ?2",
            params![now, id],
        )?;
        info!("Revived parked job {}", id);
        Ok(())
    }
}
