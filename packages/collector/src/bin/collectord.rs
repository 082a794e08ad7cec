//! Collector daemon: wires config, storage, browser and LLM together,
//! triggers one batch over all active sources and follows its progress.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collector::browser::{BrowserTool, HostPacer};
use collector::llm::SharedModel;
use collector::storage::PostgresStorage;
use collector::{BatchScheduler, CollectorConfig, CollectorEvent, TriggerKind, TriggerRequest};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,collector=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = CollectorConfig::from_env()?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let storage = PostgresStorage::new(pool);
    storage.init_schema().await?;

    let pacer = Arc::new(HostPacer::new(config.page_min_delay));
    let fetcher = Arc::new(BrowserTool::new(&config, pacer)?);
    let model = Arc::new(SharedModel::from_config(&config)?);

    let scheduler = BatchScheduler::new(model, fetcher, Arc::new(storage), config);
    let mut events = scheduler.subscribe();

    let batch_id = scheduler
        .run_batch(TriggerRequest {
            source_ids: None,
            trigger: TriggerKind::Manual,
        })
        .await?;

    // Drain whatever progress is still buffered, then print the task list.
    while let Ok(event) = events.try_recv() {
        if let CollectorEvent::TaskProgress { message, .. } = &event {
            tracing::debug!(%message, "progress");
        }
    }
    for task in scheduler.task_states(&batch_id).await? {
        println!(
            "{} [{}] {} items, status {}",
            task.source_name,
            task.batch_id,
            task.items_found,
            task.status.as_str()
        );
    }

    Ok(())
}
