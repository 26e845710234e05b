//! Redis-based job queue with reliable dequeue.
//!
//! # Queue Structure
//!
//! - `{queue_name}`: main list where jobs are enqueued
//! - `{queue_name}:processing`: jobs taken by a worker and not yet completed
//! - `{queue_name}:results:{job_id}`: stored job results, kept for 7 days
//!
//! Jobs are moved atomically from the main list to the processing list when
//! dequeued, so a job taken by a crashed worker stays visible in Redis.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use uuid::Uuid;

use super::job::{Job, JobResult};

/// Seconds a job result is kept in Redis.
const RESULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Failed to serialize job data.
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Redis-based job queue with reliable dequeue.
pub struct JobQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    queue_name: String,
    processing_queue: String,
    results_key: String,
}

impl JobQueue {
    /// Connects to Redis and creates a new job queue.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a JobQueue from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            processing_queue: format!("{}:processing", queue_name),
            results_key: format!("{}:results", queue_name),
        }
    }

    /// Enqueues a new job.
    ///
    /// Jobs are pushed on the left and popped from the right, so the queue
    /// is FIFO.
    pub async fn enqueue(&self, job: &Job) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    /// Enqueues multiple jobs in a single pipelined round trip.
    pub async fn enqueue_batch(&self, jobs: &[Job]) -> Result<(), QueueError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let serialized = jobs
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<String>, _>>()?;

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        for job_data in &serialized {
            pipe.lpush(&self.queue_name, job_data);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    /// Dequeues the next job, blocking until one is available or timeout.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(job))` if a job was dequeued
    /// - `Ok(None)` if the timeout expired with no jobs available
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_name)
            .arg(&self.processing_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match result {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Stores the result of a job and removes it from the processing list.
    pub async fn complete(&self, job_id: Uuid, result: &JobResult) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let result_key = self.result_key(job_id);
        let result_data = serde_json::to_string(result)?;
        conn.set_ex::<_, _, ()>(&result_key, &result_data, RESULT_TTL_SECS as _)
            .await?;

        self.remove_job_from_processing(job_id).await
    }

    /// Retrieves a job result by job ID.
    pub async fn get_result(&self, job_id: Uuid) -> Result<Option<JobResult>, QueueError> {
        let mut conn = self.redis.clone();
        let data: Option<String> = conn.get(self.result_key(job_id)).await?;

        match data {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Returns the number of jobs in the main queue.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    /// Returns the number of jobs currently being processed.
    pub async fn processing_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.processing_queue).await?;
        Ok(len)
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Clears the main and processing lists.
    ///
    /// Stored results expire on their own and are left alone.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        pipe.del(&self.queue_name).del(&self.processing_queue);
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    /// Returns queue statistics.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (pending_jobs, processing_jobs) =
            tokio::try_join!(self.len(), self.processing_len())?;

        Ok(QueueStats {
            queue_name: self.queue_name.clone(),
            pending_jobs,
            processing_jobs,
        })
    }

    async fn remove_job_from_processing(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let jobs: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for job_data in jobs {
            if let Ok(job) = serde_json::from_str::<Job>(&job_data) {
                if job.id == job_id {
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &job_data)
                        .await?;
                    return Ok(());
                }
            }
        }

        // Already removed.
        Ok(())
    }

    fn result_key(&self, job_id: Uuid) -> String {
        format!("{}:{}", self.results_key, job_id)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

/// Statistics about queue state.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub queue_name: String,
    /// Number of jobs waiting to be processed.
    pub pending_jobs: usize,
    /// Number of jobs currently being processed.
    pub processing_jobs: usize,
}

impl QueueStats {
    /// Returns the number of jobs not yet completed.
    pub fn total_jobs(&self) -> usize {
        self.pending_jobs + self.processing_jobs
    }
}
