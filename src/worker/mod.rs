//! Worker loop: pulls jobs off the queue and runs them through the pipeline
//!
//! Concurrency is bounded by a semaphore. Per-goal serialization is enforced
//! twice: the queue never hands out a second job for a goal with an active
//! job, and the pipeline holds a per-goal lock from fetching state through
//! applying. A failing job is reported to the queue and logged; it never
//! takes the loop down.

mod locks;
mod pipeline;
#[cfg(test)]
mod testing;

pub use locks::GoalLocks;
pub use pipeline::{JobOutcome, Pipeline};

use crate::config::{Config, RetryConfig};
use crate::error::{FailureKind, QueueError};
use crate::jobs::{retry_with_backoff, JobQueue, JobRecord, Redelivery};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Where a job is in its cycle. `failed` is an error carrying the stage it
/// failed in, not a stage of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Received,
    FetchingState,
    AwaitingOracle,
    Reconciling,
    Applying,
    Notifying,
    Completed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::FetchingState => "fetching_state",
            JobStage::AwaitingOracle => "awaiting_oracle",
            JobStage::Reconciling => "reconciling",
            JobStage::Applying => "applying",
            JobStage::Notifying => "notifying",
            JobStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the worker told the queue about a job
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Completed(JobOutcome),
    Discarded,
    Retrying(DateTime<Utc>),
    Parked,
    /// The job was redelivered elsewhere before this run reported back
    Superseded,
    /// The queue could not be updated; the stall sweep will pick the job up
    Unacknowledged,
}

/// Retry policy for queue acknowledgements, separate from the jobs' own policy
fn ack_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        backoff_base_ms: 200,
        backoff_max_ms: 2_000,
    }
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    pipeline: Pipeline,
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
    stall_timeout: Duration,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>, pipeline: Pipeline, config: &Config) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            queue,
            pipeline,
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            poll_interval: config.poll_interval(),
            stall_timeout: config.stall_timeout(),
        }
    }

    /// Run until `shutdown` resolves, then wait for in-flight jobs to finish
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Worker started with concurrency {}", self.concurrency);

        let sweep_every = (self.stall_timeout / 2).max(Duration::from_secs(1));
        let mut next_sweep = Instant::now();

        loop {
            if Instant::now() >= next_sweep {
                if let Err(e) = self.queue.requeue_stalled(self.stall_timeout).await {
                    warn!("Stalled job sweep failed: {}", e);
                }
                next_sweep = Instant::now() + sweep_every;
            }

            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.queue.dequeue().await {
                Ok(Some(record)) => {
                    let queue = self.queue.clone();
                    let pipeline = self.pipeline.clone();
                    tokio::spawn(async move {
                        let _permit = permit; // hold until done
                        handle(queue.as_ref(), &pipeline, record).await;
                    });
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("Dequeue failed: {}", e),
            }
            drop(permit);

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.poll_interval) => {}
            }
        }

        info!("Shutting down, waiting for in-flight jobs");
        let total = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if self.semaphore.acquire_many(total).await.is_err() {
            warn!("Worker semaphore closed before in-flight jobs drained");
        }
        info!("Worker stopped");
    }

    /// Process at most one job inline. Returns `None` when nothing was runnable.
    pub async fn run_once(&self) -> anyhow::Result<Option<Disposition>> {
        self.queue.requeue_stalled(self.stall_timeout).await?;
        let Some(record) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        Ok(Some(handle(self.queue.as_ref(), &self.pipeline, record).await))
    }
}

async fn handle(queue: &dyn JobQueue, pipeline: &Pipeline, record: JobRecord) -> Disposition {
    let id = record.id.as_str();
    let delivery = record.delivery;
    let retry = ack_retry();
    debug!(
        "Job {} ({} for goal {}) attempt {}/{}",
        id,
        record.job.kind(),
        record.goal_id(),
        record.attempts,
        record.retry.max_attempts
    );

    let disposition = match pipeline.process(&record).await {
        Ok(outcome) => {
            match &outcome {
                JobOutcome::Applied(result) => info!(
                    "Job {} applied to goal {}: {} created, {} updated, {} archived",
                    id,
                    record.goal_id(),
                    result.created_ids.len(),
                    result.updated_ids.len(),
                    result.archived_ids.len()
                ),
                JobOutcome::NoOp => info!("Job {} finished with nothing to apply", id),
            }
            retry_with_backoff(&retry, QueueError::is_transient, || {
                queue.complete(id, delivery)
            })
            .await
            .map(|_| Disposition::Completed(outcome))
        }
        Err(e) => {
            let reason = e.to_string();
            match e.failure_kind() {
                FailureKind::Fatal => {
                    error!("Discarding job {}: {}", id, reason);
                    retry_with_backoff(&retry, QueueError::is_transient, || {
                        queue.discard(id, delivery, &reason)
                    })
                    .await
                    .map(|_| Disposition::Discarded)
                }
                FailureKind::Retryable => {
                    warn!("Job {} failed: {}", id, reason);
                    retry_with_backoff(&retry, QueueError::is_transient, || {
                        queue.fail(id, delivery, &reason)
                    })
                    .await
                    .map(|redelivery| match redelivery {
                        Redelivery::RetryAt(at) => {
                            info!("Job {} will be retried at {}", id, at);
                            Disposition::Retrying(at)
                        }
                        Redelivery::Parked => {
                            error!(
                                "Job {} parked after {} attempts: {}",
                                id, record.attempts, reason
                            );
                            Disposition::Parked
                        }
                    })
                }
            }
        }
    };

    disposition.unwrap_or_else(|e| match e {
        QueueError::LeaseLost { current, .. } => {
            warn!(
                "Job {} delivery {} was superseded by delivery {}, leaving the job to it",
                id, delivery, current
            );
            Disposition::Superseded
        }
        e => {
            error!("Could not report job {} to the queue: {}", id, e);
            Disposition::Unacknowledged
        }
    })
}
