use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use xtimer_trigger::executor::InMemoryLockService;
use xtimer_trigger::{InMemoryTaskStore, LockingExecutor, TriggerWorker, WorkerPool};
use xtimer_worker::telemetry::{init_telemetry, TelemetryConfig};
use xtimer_worker::{
    seed_demo_timers, BucketConsumer, ConsumerConfig, LoggingCallback, MinuteFeed,
    WorkerProcessConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading any configuration
    let dotenv = dotenvy::dotenv();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "info")
    init_telemetry(TelemetryConfig::from_env());

    if let Ok(path) = dotenv {
        tracing::info!("Loaded .env from {:?}", path);
    }

    let config = WorkerProcessConfig::from_env();
    config
        .trigger
        .validate()
        .context("Invalid trigger configuration")?;

    tracing::info!(
        gap_secs = config.trigger.gap.as_secs(),
        windows_per_bucket = config.trigger.windows_per_bucket(),
        workers = config.trigger.pool.worker_count,
        buckets = config.bucket_count,
        "xtimer-worker starting..."
    );

    let store = Arc::new(InMemoryTaskStore::new());
    if config.demo_timers > 0 {
        let seeded = seed_demo_timers(&store, config.demo_timers, config.bucket_count, Utc::now());
        tracing::info!(count = seeded.len(), "Seeded demo timers");
    }

    // One pool for the whole process, shared by every bucket in flight
    let pool = WorkerPool::start(config.trigger.pool.clone());

    let executor = LockingExecutor::new(
        Arc::new(InMemoryLockService::new()),
        Arc::new(LoggingCallback),
        config.lock_ttl,
    );
    let trigger = TriggerWorker::new(&config.trigger, store, pool.clone(), Arc::new(executor))
        .context("Failed to create trigger worker")?;

    let consumer = BucketConsumer::new(
        trigger,
        ConsumerConfig {
            redelivery_delay: config.redelivery_delay,
            max_redeliveries: config.max_redeliveries,
            ..Default::default()
        },
    );
    let feed = MinuteFeed::new(config.bucket_count, consumer.sender());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_handle = tokio::spawn(feed.run(shutdown_rx.clone()));
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    feed_handle.await.context("Feed task failed")?;
    let stats = consumer_handle.await.context("Consumer task failed")?;

    pool.shutdown().await.context("Worker pool did not drain")?;

    tracing::info!(
        acked = stats.acked,
        dropped = stats.dropped,
        "Worker shutdown complete"
    );
    Ok(())
}
