//! Bucket message feed and consumer
//!
//! [`MinuteFeed`] stands in for the upstream pipeline: at every minute
//! boundary it publishes one bucket message per shard. [`BucketConsumer`]
//! hands each message to the [`TriggerWorker`] and, when the bucket is not
//! acked, puts it back on the channel after a delay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use xtimer_trigger::{BucketKey, TriggerError, TriggerWorker};

/// One delivery of a bucket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub key: String,
    /// 0 for the first delivery
    pub attempt: u32,
}

impl Delivery {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            attempt: 0,
        }
    }

    fn redelivered(&self) -> Self {
        Self {
            key: self.key.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// Publishes the bucket messages of each minute
pub struct MinuteFeed {
    bucket_count: u32,
    tx: mpsc::Sender<Delivery>,
}

impl MinuteFeed {
    pub fn new(bucket_count: u32, tx: mpsc::Sender<Delivery>) -> Self {
        Self { bucket_count, tx }
    }

    /// Messages for the minute containing `at`, one per shard
    pub fn deliveries_for(at: DateTime<Utc>, bucket_count: u32) -> Vec<Delivery> {
        (0..bucket_count)
            .map(|bucket| Delivery::new(BucketKey::for_minute(at, bucket).to_string()))
            .collect()
    }

    /// Publish the current minute, then every following one, until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = Utc::now();
            for delivery in Self::deliveries_for(now, self.bucket_count) {
                debug!(key = %delivery.key, "publishing bucket");
                if self.tx.send(delivery).await.is_err() {
                    info!("Consumer gone, stopping feed");
                    return;
                }
            }

            let next_minute = BucketKey::for_minute(now, 0).end();
            let wait = (next_minute - Utc::now())
                .max(TimeDelta::zero())
                .to_std()
                .unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("Shutdown signal received, stopping feed");
                    return;
                }
            }
        }
    }
}

/// Consumer settings
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Buffered deliveries
    pub channel_capacity: usize,
    /// Wait before a failed bucket is delivered again
    pub redelivery_delay: Duration,
    /// Redeliveries before a bucket is dropped
    pub max_redeliveries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            redelivery_delay: Duration::from_secs(1),
            max_redeliveries: 3,
        }
    }
}

/// Delivery outcomes so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub delivered: u64,
    pub acked: u64,
    pub redelivered: u64,
    /// Malformed keys and buckets that ran out of redeliveries
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    acked: AtomicU64,
    redelivered: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Feeds bucket messages to the trigger worker with at-least-once redelivery
///
/// Every delivery runs on its own task, so buckets of different shards and
/// minutes are processed concurrently.
pub struct BucketConsumer {
    trigger: TriggerWorker,
    config: ConsumerConfig,
    tx: mpsc::Sender<Delivery>,
    rx: mpsc::Receiver<Delivery>,
    in_flight: TaskTracker,
    counters: Arc<Counters>,
}

impl BucketConsumer {
    pub fn new(trigger: TriggerWorker, config: ConsumerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        Self {
            trigger,
            config,
            tx,
            rx,
            in_flight: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Sender for publishing deliveries
    pub fn sender(&self) -> mpsc::Sender<Delivery> {
        self.tx.clone()
    }

    /// Consume until shutdown, then wait for in-flight buckets
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!(
            redelivery_delay_ms = self.config.redelivery_delay.as_millis() as u64,
            max_redeliveries = self.config.max_redeliveries,
            "Starting bucket consumer"
        );

        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(delivery) => self.spawn_delivery(delivery),
                    None => break,
                },
                _ = shutdown.changed() => {
                    info!("Shutdown signal received, stopping consumer");
                    break;
                }
            }
        }

        self.in_flight.close();
        info!(
            in_flight = self.in_flight.len(),
            "Waiting for in-flight buckets"
        );
        self.in_flight.wait().await;

        let stats = self.counters.snapshot();
        info!(
            delivered = stats.delivered,
            acked = stats.acked,
            redelivered = stats.redelivered,
            dropped = stats.dropped,
            "Bucket consumer stopped"
        );
        stats
    }

    fn spawn_delivery(&self, delivery: Delivery) {
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);

        let trigger = self.trigger.clone();
        let counters = Arc::clone(&self.counters);
        let tx = self.tx.clone();
        let config = self.config.clone();

        self.in_flight.spawn(async move {
            let acked = {
                let counters = Arc::clone(&counters);
                move || {
                    counters.acked.fetch_add(1, Ordering::Relaxed);
                }
            };

            match trigger.work(&delivery.key, acked).await {
                Ok(()) => {}
                Err(TriggerError::Format(e)) => {
                    error!(key = %delivery.key, error = %e, "Dropping malformed bucket message");
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if delivery.attempt >= config.max_redeliveries => {
                    error!(
                        key = %delivery.key,
                        attempt = delivery.attempt,
                        error = %e,
                        "Bucket failed, giving up"
                    );
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(
                        key = %delivery.key,
                        attempt = delivery.attempt,
                        error = %e,
                        "Bucket failed, scheduling redelivery"
                    );
                    tokio::time::sleep(config.redelivery_delay).await;
                    match tx.try_send(delivery.redelivered()) {
                        Ok(()) => {
                            counters.redelivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(send_err) => {
                            error!(error = %send_err, "Redelivery rejected, dropping bucket");
                            counters.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        });
    }
}
