use crate::cli::{load_config, open_database, WorkerArgs};
use crate::jobs::SqliteQueue;
use crate::notify::create_notifier;
use crate::oracle::create_oracle;
use crate::store::SqliteStore;
use crate::worker::{Pipeline, Worker};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn execute(args: WorkerArgs, config_path: &Path) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;

    // Apply CLI overrides
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;

    let db = open_database(&config)?;
    let store = Arc::new(SqliteStore::new(db.clone()));
    let queue = Arc::new(SqliteQueue::new(db));
    let oracle = create_oracle(&config.oracle);
    let notifier = create_notifier(&config.notify);
    info!("Using oracle {}", oracle.name());

    let pipeline = Pipeline::new(store, oracle, notifier, &config);
    let worker = Worker::new(queue, pipeline, &config);

    if args.once {
        match worker.run_once().await? {
            Some(disposition) => println!("{:?}", disposition),
            None => println!("No runnable jobs."),
        }
        return Ok(());
    }

    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
