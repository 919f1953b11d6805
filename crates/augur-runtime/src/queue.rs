//! Job queue transport between the serving layer and the worker pool.
//!
//! The default transport is NATS (feature `nats-transport`): jobs are
//! published to a single subject and workers subscribe through a shared
//! queue group, so each job is delivered to exactly one pool member.
//! Liveness is a request/reply ping that any idle worker answers. An
//! in-memory implementation backs standalone mode and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use augur_core::JobPayload;

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

pub const DEFAULT_QUEUE_URL: &str = "nats://localhost:4222";
pub const DEFAULT_SUBJECT_PREFIX: &str = "augur";

/// Queue group shared by every worker so each job lands on one member.
pub const WORKER_QUEUE_GROUP: &str = "augur-workers";

/// Body a worker sends back to a liveness ping.
pub const PING_RESPONSE: &str = "Ready!";

/// Subject carrying job payloads (queue-group consumed).
pub fn subject_jobs(prefix: &str) -> String {
    format!("{prefix}.jobs")
}

/// Subject for worker liveness pings (request/reply).
pub fn subject_ping(prefix: &str) -> String {
    format!("{prefix}.ping")
}

// ---------------------------------------------------------------------------
// Errors and traits
// ---------------------------------------------------------------------------

/// Errors from queue transport operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("serialization failed: {0}")]
    Serialize(serde_json::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(serde_json::Error),
    #[error("queue connect failed: {0}")]
    Connect(String),
    #[error("queue publish failed: {0}")]
    Publish(String),
    #[error("queue request failed: {0}")]
    Request(String),
    #[error("queue subscribe failed: {0}")]
    Subscribe(String),
    #[error("no worker answered the ping in time")]
    Timeout,
    #[error("queue is closed")]
    Closed,
    #[error("queue transport not available: {0}")]
    NotAvailable(String),
}

/// Producer side of the job queue, used by the dispatcher.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue one job for the worker pool.
    async fn publish(&self, payload: &JobPayload) -> Result<(), QueueError>;

    /// Round-trip liveness probe against the worker pool.
    async fn ping(&self, timeout: Duration) -> Result<(), QueueError>;
}

/// Consumer side of the job queue, one per worker task.
#[async_trait]
pub trait JobConsumer: Send {
    /// Next job payload. `Ok(None)` means the queue shut down.
    async fn next_job(&mut self) -> Result<Option<JobPayload>, QueueError>;
}

// ---------------------------------------------------------------------------
// NATS transport (requires nats-transport feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "nats-transport")]
mod nats_impl {
    use super::*;
    use futures_util::StreamExt;
    use tracing::{debug, info, warn};

    /// NATS-backed job queue.
    #[derive(Clone)]
    pub struct NatsQueue {
        client: async_nats::Client,
        prefix: String,
    }

    impl NatsQueue {
        /// Connect to a NATS server.
        pub async fn connect(url: &str, prefix: &str) -> Result<Self, QueueError> {
            let client = async_nats::connect(url)
                .await
                .map_err(|e| QueueError::Connect(e.to_string()))?;
            info!("connected to job queue at {}", url);
            Ok(NatsQueue {
                client,
                prefix: prefix.to_string(),
            })
        }

        /// Raw client handle, for the worker-side ping responder.
        pub fn client(&self) -> &async_nats::Client {
            &self.client
        }

        pub fn prefix(&self) -> &str {
            &self.prefix
        }

        /// Subscribe to the job subject through the worker queue group.
        pub async fn consumer(&self) -> Result<NatsJobConsumer, QueueError> {
            let subscriber = self
                .client
                .queue_subscribe(subject_jobs(&self.prefix), WORKER_QUEUE_GROUP.to_string())
                .await
                .map_err(|e| QueueError::Subscribe(e.to_string()))?;
            Ok(NatsJobConsumer { subscriber })
        }
    }

    #[async_trait]
    impl JobQueue for NatsQueue {
        async fn publish(&self, payload: &JobPayload) -> Result<(), QueueError> {
            let bytes = serde_json::to_vec(payload).map_err(QueueError::Serialize)?;
            self.client
                .publish(subject_jobs(&self.prefix), bytes.into())
                .await
                .map_err(|e| QueueError::Publish(e.to_string()))?;
            self.client
                .flush()
                .await
                .map_err(|e| QueueError::Publish(e.to_string()))
        }

        async fn ping(&self, timeout: Duration) -> Result<(), QueueError> {
            let resp = tokio::time::timeout(
                timeout,
                self.client.request(subject_ping(&self.prefix), "ping".into()),
            )
            .await
            .map_err(|_| QueueError::Timeout)?
            .map_err(|e| QueueError::Request(e.to_string()))?;
            if resp.payload.as_ref() == PING_RESPONSE.as_bytes() {
                Ok(())
            } else {
                Err(QueueError::Request(format!(
                    "unexpected ping reply: {:?}",
                    String::from_utf8_lossy(&resp.payload)
                )))
            }
        }
    }

    /// Queue-group subscriber yielding decoded payloads.
    pub struct NatsJobConsumer {
        subscriber: async_nats::Subscriber,
    }

    #[async_trait]
    impl JobConsumer for NatsJobConsumer {
        async fn next_job(&mut self) -> Result<Option<JobPayload>, QueueError> {
            while let Some(msg) = self.subscriber.next().await {
                match serde_json::from_slice::<JobPayload>(&msg.payload) {
                    Ok(payload) => return Ok(Some(payload)),
                    // A malformed message is dropped, not fatal: one bad
                    // publisher must not wedge the whole pool.
                    Err(e) => warn!("discarding undecodable job payload: {}", e),
                }
            }
            Ok(None)
        }
    }

    /// Answer liveness pings on behalf of a worker process.
    ///
    /// Runs until the subscription closes. Every worker runs one of these;
    /// any one of them answering is enough for readiness.
    pub async fn run_ping_responder(
        client: async_nats::Client,
        prefix: String,
    ) -> Result<(), QueueError> {
        let mut sub = client
            .subscribe(subject_ping(&prefix))
            .await
            .map_err(|e| QueueError::Subscribe(e.to_string()))?;
        debug!("ping responder listening on {}", subject_ping(&prefix));
        while let Some(msg) = sub.next().await {
            if let Some(reply) = msg.reply {
                if let Err(e) = client.publish(reply, PING_RESPONSE.into()).await {
                    warn!("failed to answer ping: {}", e);
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "nats-transport")]
pub use nats_impl::{run_ping_responder, NatsJobConsumer, NatsQueue};

#[cfg(not(feature = "nats-transport"))]
pub struct NatsQueue;

#[cfg(not(feature = "nats-transport"))]
impl NatsQueue {
    pub async fn connect(_url: &str, _prefix: &str) -> Result<Self, QueueError> {
        Err(QueueError::NotAvailable(
            "NATS queue requires 'nats-transport' feature".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// In-memory queue (standalone mode and tests)
// ---------------------------------------------------------------------------

/// Unbounded in-process queue with competing consumers.
///
/// Consumers share one receiver behind a mutex, which mirrors the
/// queue-group delivery of the NATS transport: each payload is taken by
/// exactly one consumer. `ping` succeeds only while at least one consumer
/// is alive, so standalone readiness stays honest.
#[derive(Clone)]
pub struct InMemoryQueue {
    tx: mpsc::UnboundedSender<JobPayload>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<JobPayload>>>,
    consumers: Arc<AtomicUsize>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        InMemoryQueue {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            consumers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// New competing consumer over the shared channel.
    pub fn consumer(&self) -> InMemoryConsumer {
        self.consumers.fetch_add(1, Ordering::SeqCst);
        InMemoryConsumer {
            rx: self.rx.clone(),
            consumers: self.consumers.clone(),
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        InMemoryQueue::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn publish(&self, payload: &JobPayload) -> Result<(), QueueError> {
        self.tx.send(payload.clone()).map_err(|_| QueueError::Closed)
    }

    async fn ping(&self, _timeout: Duration) -> Result<(), QueueError> {
        if self.consumers.load(Ordering::SeqCst) > 0 {
            Ok(())
        } else {
            Err(QueueError::Timeout)
        }
    }
}

/// Consumer half of [`InMemoryQueue`].
pub struct InMemoryConsumer {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<JobPayload>>>,
    consumers: Arc<AtomicUsize>,
}

#[async_trait]
impl JobConsumer for InMemoryConsumer {
    async fn next_job(&mut self) -> Result<Option<JobPayload>, QueueError> {
        Ok(self.rx.lock().await.recv().await)
    }
}

impl Drop for InMemoryConsumer {
    fn drop(&mut self) {
        self.consumers.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use augur_core::ModelId;

    fn payload() -> JobPayload {
        JobPayload::new(ModelId::from("m2"), "alice", vec![Default::default()])
    }

    #[test]
    fn test_subject_jobs() {
        assert_eq!(subject_jobs("augur"), "augur.jobs");
    }

    #[test]
    fn test_subject_ping() {
        assert_eq!(subject_ping("augur"), "augur.ping");
        assert_eq!(subject_ping("staging.augur"), "staging.augur.ping");
    }

    #[tokio::test]
    async fn test_in_memory_delivery() {
        let queue = InMemoryQueue::new();
        let mut consumer = queue.consumer();

        let sent = payload();
        queue.publish(&sent).await.unwrap();

        let got = consumer.next_job().await.unwrap().unwrap();
        assert_eq!(got, sent);
    }

    #[tokio::test]
    async fn test_each_job_goes_to_one_consumer() {
        let queue = InMemoryQueue::new();
        let mut a = queue.consumer();
        let mut b = queue.consumer();

        queue.publish(&payload()).await.unwrap();
        queue.publish(&payload()).await.unwrap();

        let first = a.next_job().await.unwrap().unwrap();
        let second = b.next_job().await.unwrap().unwrap();
        assert_ne!(first.job_id, second.job_id);
    }

    #[tokio::test]
    async fn test_ping_reflects_consumer_presence() {
        let queue = InMemoryQueue::new();
        assert!(matches!(
            queue.ping(Duration::from_millis(10)).await,
            Err(QueueError::Timeout)
        ));

        let consumer = queue.consumer();
        assert!(queue.ping(Duration::from_millis(10)).await.is_ok());

        drop(consumer);
        assert!(queue.ping(Duration::from_millis(10)).await.is_err());
    }

    #[cfg(not(feature = "nats-transport"))]
    #[tokio::test]
    async fn test_nats_stub_reports_not_available() {
        let err = NatsQueue::connect(DEFAULT_QUEUE_URL, DEFAULT_SUBJECT_PREFIX)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, QueueError::NotAvailable(_)));
    }
}
