pub mod enqueue;
pub mod import;
pub mod jobs;
pub mod schema;
pub mod worker;

use crate::config::Config;
use crate::db::{self, Db};
use crate::jobs::{AdaptTrigger, JobState};
use crate::model::SkillLevel;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "goalplan")]
#[command(
    author,
    version,
    about = "Background plan adaptation engine for goal-based task schedules"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(
        short,
        long,
        global = true,
        env = "GOALPLAN_CONFIG",
        default_value = "goalplan.yaml"
    )]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process adaptation jobs until Ctrl-C
    Worker(WorkerArgs),

    /// Put a job on the queue
    Enqueue(EnqueueArgs),

    /// List queued, active and dead jobs
    Jobs(JobsArgs),

    /// Return a parked job to the queue with a fresh attempt budget
    Revive(ReviveArgs),

    /// Load goals and tasks from a JSON file
    Import(ImportArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct WorkerArgs {
    /// Override max jobs in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Process a single job and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Parser, Clone)]
pub struct EnqueueArgs {
    #[command(subcommand)]
    pub job: EnqueueJob,
}

#[derive(Subcommand, Clone)]
pub enum EnqueueJob {
    /// Build the first plan for a new goal
    Generate {
        #[arg(long)]
        goal_id: String,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        goal_name: String,

        #[arg(long)]
        duration_days: u32,

        #[arg(long, default_value_t = 1.0)]
        time_per_day_hours: f64,

        #[arg(long, default_value = "beginner")]
        skill_level: SkillLevel,
    },

    /// Re-plan an existing goal after its schedule changed
    Adapt {
        #[arg(long)]
        goal_id: String,

        #[arg(long, value_enum)]
        trigger: AdaptTrigger,
    },

    /// Enqueue a JSON payload exactly as the web tier sends it
    Raw {
        /// e.g. '{"kind":"adapt","goalId":"g1","trigger":"manual_trigger"}'
        payload: String,
    },
}

#[derive(Parser, Clone)]
pub struct JobsArgs {
    /// Only show jobs in this state
    #[arg(long, value_enum)]
    pub state: Option<JobState>,

    /// Print job records as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct ReviveArgs {
    /// Id of the parked job
    pub id: String,
}

#[derive(Parser, Clone)]
pub struct ImportArgs {
    /// JSON file with `goals` and `tasks` arrays
    pub file: PathBuf,
}

/// Load the config file (or defaults when it does not exist) and validate it
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load_or_default(path)?;
    config.validate()?;
    Ok(config)
}

pub fn open_database(config: &Config) -> anyhow::Result<Db> {
    info!("Opening database {:?}", config.database);
    db::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))
}
