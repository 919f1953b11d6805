//! Augur Runtime - transports and execution for the model-serving engine.
//!
//! This crate provides everything that moves jobs and records between
//! processes: the queue transport, the result store, the worker pool that
//! drains the queue, and the Prometheus metrics both sides report.

pub mod metrics;
pub mod queue;
pub mod store;
pub mod worker;

pub use metrics::Metrics;
pub use queue::{
    subject_jobs, subject_ping, InMemoryConsumer, InMemoryQueue, JobConsumer, JobQueue, QueueError,
    DEFAULT_QUEUE_URL, DEFAULT_SUBJECT_PREFIX, PING_RESPONSE, WORKER_QUEUE_GROUP,
};
pub use store::{
    InMemoryStore, ResultStore, StoreError, DEFAULT_KEY_PREFIX, DEFAULT_RESULT_TTL_SECS,
    DEFAULT_STORE_URL,
};
pub use worker::{consume, Worker, WorkerConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

// Queue transport exports (NATS impl requires "nats-transport" feature).
#[cfg(feature = "nats-transport")]
pub use queue::{run_ping_responder, NatsJobConsumer, NatsQueue};

// Result store exports (Redis impl requires "redis-store" feature).
#[cfg(feature = "redis-store")]
pub use store::RedisStore;
