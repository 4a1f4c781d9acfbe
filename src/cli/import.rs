//! CLI handler for the `import` subcommand
//!
//! Seeds goals and tasks owned by the surrounding application so a worker
//! can be run against them locally.

use crate::cli::{load_config, open_database, ImportArgs};
use crate::model::{Goal, Task};
use crate::store::SqliteStore;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ImportFile {
    #[serde(default)]
    goals: Vec<Goal>,
    #[serde(default)]
    tasks: Vec<Task>,
}

pub async fn execute(args: ImportArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let import: ImportFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    let store = SqliteStore::new(open_database(&config)?);
    // Goals first so task foreign keys resolve
    for goal in &import.goals {
        store.upsert_goal(goal).await?;
    }
    for task in &import.tasks {
        store
            .upsert_task(task)
            .await
            .with_context(|| format!("Failed to import task {}", task.id))?;
    }

    println!(
        "Imported {} goals and {} tasks",
        import.goals.len(),
        import.tasks.len()
    );
    Ok(())
}
