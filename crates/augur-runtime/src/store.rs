//! Persistent job records.
//!
//! The default backend is Redis (feature `redis-store`): one key per job,
//! JSON body, expiring after a configurable TTL. Every write goes through
//! the lifecycle guard from `augur_core::job`, so replayed or out-of-order
//! deliveries can never overwrite a terminal record. An in-memory store
//! backs standalone mode and tests.

use async_trait::async_trait;

use augur_core::{write_allowed, JobId, JobRecord};

pub const DEFAULT_STORE_URL: &str = "redis://localhost:6379";
pub const DEFAULT_KEY_PREFIX: &str = "augur:jobs:";

/// Default record TTL: one day.
pub const DEFAULT_RESULT_TTL_SECS: u64 = 86_400;

/// Errors from result store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store connect failed: {0}")]
    ConnectionFailed(String),
    #[error("store operation failed: {0}")]
    Backend(String),
    #[error("serialization failed: {0}")]
    Serialize(serde_json::Error),
    #[error("stored record is malformed: {0}")]
    Corrupt(String),
    #[error("result store not available: {0}")]
    NotAvailable(String),
}

/// Keyed store of job records shared by the dispatcher and the workers.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write a record, subject to the lifecycle guard. A write refused by
    /// the guard is dropped silently and reported as success: the caller
    /// holding stale state is exactly the case the guard exists for.
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Fetch a record by job id.
    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Remove a record. Used to roll back a PENDING write when the enqueue
    /// that should have followed it failed.
    async fn delete(&self, job_id: &JobId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Redis store (requires redis-store feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "redis-store")]
mod redis_impl {
    use super::*;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;
    use tracing::{debug, info};

    /// SET guarded against overwriting a terminal record. The client-side
    /// guard already filtered illegal transitions from its own read; this
    /// script closes the read-to-write window where another worker could
    /// have finished the job in the meantime.
    const GUARDED_SET: &str = r#"
local cur = redis.call('GET', KEYS[1])
if cur then
    local ok, doc = pcall(cjson.decode, cur)
    if ok and doc and (doc['status'] == 'SUCCESS' or doc['status'] == 'FAILURE') then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
return 1
"#;

    /// Redis-backed result store.
    #[derive(Clone)]
    pub struct RedisStore {
        conn: ConnectionManager,
        key_prefix: String,
        ttl_secs: u64,
        guarded_set: redis::Script,
    }

    impl RedisStore {
        pub async fn connect(
            url: &str,
            key_prefix: &str,
            ttl_secs: u64,
        ) -> Result<Self, StoreError> {
            let client = redis::Client::open(url)
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
            info!("connected to result store at {}", url);
            Ok(RedisStore {
                conn,
                key_prefix: key_prefix.to_string(),
                ttl_secs,
                guarded_set: redis::Script::new(GUARDED_SET),
            })
        }

        fn key(&self, job_id: &JobId) -> String {
            format!("{}{}", self.key_prefix, job_id)
        }
    }

    #[async_trait]
    impl ResultStore for RedisStore {
        async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
            let key = self.key(&record.job_id);
            let mut conn = self.conn.clone();

            let existing: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let current = match existing {
                Some(raw) => Some(
                    serde_json::from_str::<JobRecord>(&raw)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?
                        .status,
                ),
                None => None,
            };
            if !write_allowed(current, record.status) {
                debug!(
                    "dropping write of job {} to {}: record is already {:?}",
                    record.job_id, record.status, current
                );
                return Ok(());
            }

            let body = serde_json::to_string(record).map_err(StoreError::Serialize)?;
            let written: i32 = self
                .guarded_set
                .key(&key)
                .arg(body)
                .arg(self.ttl_secs)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if written == 0 {
                debug!(
                    "dropping write of job {} to {}: finished concurrently",
                    record.job_id, record.status
                );
            }
            Ok(())
        }

        async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
            let mut conn = self.conn.clone();
            let raw: Option<String> = conn
                .get(self.key(job_id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            match raw {
                Some(raw) => serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt(e.to_string())),
                None => Ok(None),
            }
        }

        async fn delete(&self, job_id: &JobId) -> Result<(), StoreError> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(self.key(job_id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))
        }
    }
}

#[cfg(feature = "redis-store")]
pub use redis_impl::RedisStore;

#[cfg(not(feature = "redis-store"))]
pub struct RedisStore;

#[cfg(not(feature = "redis-store"))]
impl RedisStore {
    pub async fn connect(
        _url: &str,
        _key_prefix: &str,
        _ttl_secs: u64,
    ) -> Result<Self, StoreError> {
        Err(StoreError::NotAvailable(
            "Redis result store requires 'redis-store' feature".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// In-memory store (standalone mode and tests)
// ---------------------------------------------------------------------------

/// Hash map store with the same guard semantics as the Redis backend.
/// Records never expire; standalone processes are expected to be
/// short-lived.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: std::sync::Arc<tokio::sync::RwLock<std::collections::HashMap<String, JobRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let current = records.get(record.job_id.as_str()).map(|r| r.status);
        if !write_allowed(current, record.status) {
            tracing::debug!(
                "dropping write of job {} to {}: record is already {:?}",
                record.job_id,
                record.status,
                current
            );
            return Ok(());
        }
        records.insert(record.job_id.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.read().await.get(job_id.as_str()).cloned())
    }

    async fn delete(&self, job_id: &JobId) -> Result<(), StoreError> {
        self.records.write().await.remove(job_id.as_str());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use augur_core::{JobPayload, JobStatus, ModelId, PredictionResult};
    use std::time::Duration;

    fn record() -> JobRecord {
        let payload = JobPayload::new(ModelId::from("m2"), "alice", vec![Default::default()]);
        JobRecord::from_payload(&payload)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryStore::new();
        let pending = record();
        store.put(&pending).await.unwrap();

        let got = store.get(&pending.job_id).await.unwrap().unwrap();
        assert_eq!(got, pending);
        assert!(store.get(&JobId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_writes_progress() {
        let store = InMemoryStore::new();
        let pending = record();
        store.put(&pending).await.unwrap();
        store.put(&pending.with_status(JobStatus::Started)).await.unwrap();

        let result = PredictionResult::new(vec![1.0], Duration::from_millis(2));
        store.put(&pending.succeeded(result)).await.unwrap();

        let got = store.get(&pending.job_id).await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Success);
        assert!(got.result.is_some());
    }

    #[tokio::test]
    async fn test_terminal_records_are_frozen() {
        let store = InMemoryStore::new();
        let pending = record();
        let done = pending.succeeded(PredictionResult::new(vec![1.0], Duration::from_millis(2)));
        store.put(&done).await.unwrap();

        // A late failure from a redelivered copy of the job is dropped.
        store.put(&pending.failed("late duplicate")).await.unwrap();
        let got = store.get(&pending.job_id).await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Success);
        assert!(got.detail.is_none());
    }

    #[tokio::test]
    async fn test_stale_regressions_are_dropped() {
        let store = InMemoryStore::new();
        let pending = record();
        store.put(&pending.with_status(JobStatus::Started)).await.unwrap();

        // A duplicate PENDING write arriving after the claim is ignored.
        store.put(&pending).await.unwrap();
        let got = store.get(&pending.job_id).await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Started);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = InMemoryStore::new();
        let pending = record();
        store.put(&pending).await.unwrap();
        store.delete(&pending.job_id).await.unwrap();
        assert!(store.get(&pending.job_id).await.unwrap().is_none());
        assert_eq!(store.len().await, 0);
    }
}
