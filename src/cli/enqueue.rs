//! CLI handler for the `enqueue` subcommand
//!
//! This is the trigger side: it records the job and returns immediately.
//! Outcomes surface through notifications once a worker picks it up.

use crate::cli::{load_config, open_database, EnqueueArgs, EnqueueJob};
use crate::jobs::{
    AdaptPayload, AdaptationJob, EnqueueOutcome, GeneratePayload, JobQueue, SqliteQueue,
};
use anyhow::Context;
use std::path::Path;

fn build_job(job: EnqueueJob) -> anyhow::Result<AdaptationJob> {
    Ok(match job {
        EnqueueJob::Generate {
            goal_id,
            user_id,
            goal_name,
            duration_days,
            time_per_day_hours,
            skill_level,
        } => AdaptationJob::Generate(GeneratePayload {
            goal_id,
            user_id,
            goal_name,
            duration_days,
            time_per_day_hours,
            skill_level,
        }),
        EnqueueJob::Adapt { goal_id, trigger } => {
            AdaptationJob::Adapt(AdaptPayload { goal_id, trigger })
        }
        EnqueueJob::Raw { payload } => {
            serde_json::from_str(&payload).context("Payload is not a valid generate/adapt job")?
        }
    })
}

pub async fn execute(args: EnqueueArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let job = build_job(args.job)?;
    if job.goal_id().trim().is_empty() {
        anyhow::bail!("goal id must not be empty");
    }

    let queue = SqliteQueue::new(open_database(&config)?);
    let outcome = queue.enqueue(&job, &config.retry).await?;
    let verb = match outcome {
        EnqueueOutcome::Enqueued(_) => "Enqueued",
        EnqueueOutcome::Coalesced(_) => "Coalesced into waiting",
    };
    println!(
        "{} {} job {} for goal {}",
        verb,
        job.kind(),
        outcome.job_id(),
        job.goal_id()
    );
    Ok(())
}
