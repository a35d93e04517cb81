// Trigger worker process
//
// Wires the trigger library into a runnable service:
// - MinuteFeed publishes one bucket message per shard per minute
// - BucketConsumer runs TriggerWorker per message and redelivers failures
// - LoggingCallback is the firing side effect for local runs

pub mod callback;
pub mod config;
pub mod consumer;
pub mod telemetry;

pub use callback::{bucket_of, seed_demo_timers, LoggingCallback};
pub use config::WorkerProcessConfig;
pub use consumer::{BucketConsumer, ConsumerConfig, ConsumerStats, Delivery, MinuteFeed};
