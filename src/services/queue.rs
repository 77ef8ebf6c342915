use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::activity::RequestMeta;
use crate::models::verification::VerifyOptions;

const QUEUE_KEY: &str = "bulk_verify:jobs";
const PROCESSING_KEY: &str = "bulk_verify:processing";

/// Job payload serialized into Redis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub organization_id: String,
    pub user_id: String,
    pub emails: Vec<String>,
    #[serde(default)]
    pub options: VerifyOptions,
    #[serde(default)]
    pub request: RequestMeta,
    /// Deliveries that ended without settling the job.
    #[serde(default)]
    pub attempt: u32,
}

/// Hands an accepted job to the worker side.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), QueueError>;
}

/// Redis-backed async job queue.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::from)?;
        Ok(Self { client })
    }

    /// Enqueue a job for the worker.
    pub async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::from)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    /// Dequeue a job for processing, moving it onto the processing list.
    pub async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::from)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::from)?;

        match result {
            Some(payload) => {
                let job: QueuedJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Push every payload left on the processing list back onto the queue
    /// with its attempt count raised. Only safe while no other worker is
    /// consuming the queue.
    pub async fn requeue_stranded(&self) -> Result<usize, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::from)?;
        let stranded: Vec<String> = conn
            .lrange(PROCESSING_KEY, 0, -1)
            .await
            .map_err(QueueError::from)?;

        for payload in &stranded {
            let mut job: QueuedJob = serde_json::from_str(payload).map_err(QueueError::Serialize)?;
            job.attempt += 1;
            self.enqueue(&job).await?;
            conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, payload)
                .await
                .map_err(QueueError::from)?;
        }
        Ok(stranded.len())
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::from)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    /// Number of jobs waiting to be picked up.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::from)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::from)?;
        Ok(depth)
    }

    /// Remove a finished job from the processing list.
    pub async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::from)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.enqueue(job).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[source] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            QueueError::Unavailable(err.to_string())
        } else {
            QueueError::Redis(err)
        }
    }
}
