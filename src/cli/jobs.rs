use crate::cli::{load_config, open_database, JobsArgs, ReviveArgs};
use crate::jobs::{JobQueue, JobRecord, SqliteQueue};
use std::path::Path;

fn format_row(record: &JobRecord) -> String {
    let mut line = format!(
        "{}  {:<9}  {:<8}  goal={}  attempts={}/{}  run_at={}",
        record.id,
        record.state.as_str(),
        record.job.kind(),
        record.goal_id(),
        record.attempts,
        record.retry.max_attempts,
        record.run_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(error) = &record.last_error {
        line.push_str(&format!("  error={}", error));
    }
    line
}

pub async fn execute(args: JobsArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let queue = SqliteQueue::new(open_database(&config)?);
    let records = queue.list(args.state).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_row(record));
    }
    Ok(())
}

pub async fn revive(args: ReviveArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let queue = SqliteQueue::new(open_database(&config)?);
    queue.revive(&args.id).await?;
    println!("Revived job {}", args.id);
    Ok(())
}
