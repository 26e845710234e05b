//! Worker pool for processing structure jobs from the Redis queue.
//!
//! Each worker runs as an independent async task that pulls jobs from the
//! shared queue and runs the structure pipeline on them. Before every dequeue
//! a worker checks whether its node has been disabled and, if so, idles until
//! the node is enabled again.
//!
//! Jobs are not retried: a pipeline error or timeout is recorded as the job's
//! result and the worker moves on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cluster::{local_node_name, WorkerRegistry};
use crate::pipeline::StructureRunner;

use super::job::{Job, JobResult};
use super::queue::{JobQueue, QueueError};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to connect to the job queue.
    #[error("Queue connection failed: {0}")]
    QueueConnection(#[from] QueueError),

    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Redis connection URL.
    pub redis_url: String,
    /// Name of the job queue.
    pub queue_name: String,
    /// Name of this node in the disabled-worker set.
    pub node_name: String,
    /// How long a dequeue blocks, and how long a disabled worker idles.
    pub poll_interval: Duration,
    /// Maximum time allowed for processing a single job.
    pub job_timeout: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            redis_url: "redis://localhost:6379/0".to_string(),
            queue_name: "structures".to_string(),
            node_name: local_node_name(),
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing jobs.
    pub active_workers: usize,
    /// Jobs whose pipeline run finished, including runs with no results.
    pub jobs_completed: u64,
    /// Jobs that failed or timed out.
    pub jobs_failed: u64,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            jobs_completed: completed,
            jobs_failed: failed,
            average_job_duration: average_duration,
        }
    }
}

/// Worker pool that manages multiple workers processing jobs from a queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<JobQueue>,
    runner: Arc<StructureRunner>,
    registry: Arc<dyn WorkerRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    /// Creates a new worker pool, connecting to the configured queue.
    pub async fn new(
        config: WorkerPoolConfig,
        runner: Arc<StructureRunner>,
        registry: Arc<dyn WorkerRegistry>,
    ) -> Result<Self, PoolError> {
        let queue = JobQueue::connect(&config.redis_url, &config.queue_name).await?;
        Ok(Self::with_queue(config, Arc::new(queue), runner, registry))
    }

    /// Creates a worker pool with an existing queue connection.
    pub fn with_queue(
        config: WorkerPoolConfig,
        queue: Arc<JobQueue>,
        runner: Arc<StructureRunner>,
        registry: Arc<dyn WorkerRegistry>,
    ) -> Self {
        // Buffer size of 1 is sufficient since we only send once
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            queue,
            runner,
            registry,
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("{}-worker-{}", self.config.node_name, i),
                node_name: self.config.node_name.clone(),
                queue: Arc::clone(&self.queue),
                runner: Arc::clone(&self.runner),
                registry: Arc::clone(&self.registry),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: self.config.poll_interval,
                job_timeout: self.config.job_timeout,
                stats: Arc::clone(&self.stats),
            };

            let handle = tokio::spawn(async move {
                worker.run().await;
            });

            self.worker_handles.push(handle);
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(
            num_workers = self.config.num_workers,
            node = %self.config.node_name,
            queue = %self.config.queue_name,
            "Worker pool started"
        );

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Workers finish their current job before stopping.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ShutdownTimeout` if workers don't stop within
    /// the configured timeout.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");

        // Workers may have already stopped
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.worker_handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        let result = tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await;
        self.is_running.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout)),
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }
}

/// A single worker that processes jobs from the queue.
pub struct Worker {
    id: String,
    node_name: String,
    queue: Arc<JobQueue>,
    runner: Arc<StructureRunner>,
    registry: Arc<dyn WorkerRegistry>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    job_timeout: Duration,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    /// Main worker loop.
    ///
    /// Polls for jobs and processes them until a shutdown signal is received.
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");
        let mut paused = false;

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            if !node_accepts_jobs(self.registry.as_ref(), &self.node_name).await {
                if !paused {
                    warn!(worker_id = %self.id, node = %self.node_name, "Node disabled, pausing");
                    paused = true;
                }
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            if paused {
                info!(worker_id = %self.id, node = %self.node_name, "Node enabled, resuming");
                paused = false;
            }

            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(job)) => self.process_job(job).await,
                Ok(None) => debug!(worker_id = %self.id, "No jobs available"),
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue job");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process_job(&self, mut job: Job) {
        let job_id = job.id;
        let start_time = Instant::now();
        job.increment_attempts();

        info!(
            worker_id = %self.id,
            job_id = %job_id,
            pdb = %job.task.pdb_path.display(),
            attempt = job.attempts,
            "Processing job"
        );

        self.stats.increment_active();
        let result = execute_job(&self.runner, &job, &self.id, self.job_timeout).await;
        let duration = start_time.elapsed();
        self.stats.decrement_active();

        if let Err(e) = self.queue.complete(job_id, &result).await {
            error!(
                worker_id = %self.id,
                job_id = %job_id,
                error = %e,
                "Failed to mark job complete"
            );
        }

        if result.is_success() {
            self.stats.record_completion(duration);
            info!(
                worker_id = %self.id,
                job_id = %job_id,
                status = %result.status,
                duration_ms = duration.as_millis() as u64,
                "Job completed"
            );
        } else {
            self.stats.record_failure(duration);
            warn!(
                worker_id = %self.id,
                job_id = %job_id,
                status = %result.status,
                error = ?result.error,
                "Job failed"
            );
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Returns whether `node` may take jobs.
///
/// A registry that cannot be read does not stop the node.
pub async fn node_accepts_jobs(registry: &dyn WorkerRegistry, node: &str) -> bool {
    match registry.is_disabled(node).await {
        Ok(disabled) => !disabled,
        Err(e) => {
            warn!(node = node, error = %e, "Could not read disabled workers, continuing");
            true
        }
    }
}

/// Runs one job through the pipeline with a timeout and builds its result.
pub async fn execute_job(
    runner: &StructureRunner,
    job: &Job,
    worker_id: &str,
    job_timeout: Duration,
) -> JobResult {
    let start_time = Instant::now();
    let execution = runner.process(&job.task.pdb_path, &job.task.output_dir);

    match tokio::time::timeout(job_timeout, execution).await {
        Ok(Ok(outcome)) => JobResult::finished(
            job.id,
            worker_id,
            outcome.kind(),
            start_time.elapsed().as_millis() as u64,
        ),
        Ok(Err(e)) => JobResult::failure(
            job.id,
            worker_id,
            e.to_string(),
            start_time.elapsed().as_millis() as u64,
        ),
        Err(_) => JobResult::timeout(job.id, worker_id, start_time.elapsed().as_millis() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryWorkerRegistry;
    use crate::error::RegistryError;
    use crate::pipeline::PipelineConfig;
    use crate::scheduler::{JobStatus, StructureTask};
    use tempfile::TempDir;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();

        assert_eq!(config.num_workers, 1);
        assert_eq!(config.redis_url, "redis://localhost:6379/0");
        assert_eq!(config.queue_name, "structures");
        assert!(!config.node_name.is_empty());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new(8)
            .with_redis_url("redis://custom:6380")
            .with_queue_name("my_queue")
            .with_node_name("worker3")
            .with_poll_interval(Duration::from_secs(5))
            .with_job_timeout(Duration::from_secs(7200))
            .with_shutdown_timeout(Duration::from_secs(120));

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.redis_url, "redis://custom:6380");
        assert_eq!(config.queue_name, "my_queue");
        assert_eq!(config.node_name, "worker3");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.job_timeout, Duration::from_secs(7200));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();

        assert_eq!(stats.num_workers, 0);
        assert_eq!(stats.active_workers, 0);
        assert_eq!(stats.total_processed(), 0);
        assert_eq!(stats.average_job_duration, Duration::ZERO);
        assert!((stats.success_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            num_workers: 4,
            active_workers: 2,
            jobs_completed: 80,
            jobs_failed: 20,
            average_job_duration: Duration::from_secs(60),
        };

        assert_eq!(stats.total_processed(), 100);
        assert!((stats.success_rate() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_pool_stats() {
        let stats = SharedPoolStats::new();

        stats.record_completion(Duration::from_secs(10));
        stats.record_completion(Duration::from_secs(20));
        stats.record_failure(Duration::from_secs(5));

        let pool_stats = stats.to_pool_stats(4);

        assert_eq!(pool_stats.num_workers, 4);
        assert_eq!(pool_stats.jobs_completed, 2);
        assert_eq!(pool_stats.jobs_failed, 1);
        // (10000 + 20000 + 5000) / 3 = 11666 ms
        assert!(pool_stats.average_job_duration.as_millis() > 11000);
        assert!(pool_stats.average_job_duration.as_millis() < 12000);
    }

    #[test]
    fn test_shared_pool_stats_active_workers() {
        let stats = SharedPoolStats::new();

        stats.increment_active();
        stats.increment_active();
        assert_eq!(stats.active_workers.load(Ordering::SeqCst), 2);

        stats.decrement_active();
        assert_eq!(stats.active_workers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_error_display() {
        assert!(PoolError::AlreadyRunning.to_string().contains("already running"));
        assert!(PoolError::NotRunning.to_string().contains("not running"));

        let err = PoolError::ShutdownTimeout(Duration::from_secs(60));
        assert!(err.to_string().contains("60"));
    }

    struct UnreachableRegistry;

    #[async_trait::async_trait]
    impl WorkerRegistry for UnreachableRegistry {
        async fn disable(&self, _name: &str) -> Result<(), RegistryError> {
            Err(RegistryError::ConnectionFailed("down".to_string()))
        }

        async fn enable(&self, _name: &str) -> Result<(), RegistryError> {
            Err(RegistryError::ConnectionFailed("down".to_string()))
        }

        async fn is_disabled(&self, _name: &str) -> Result<bool, RegistryError> {
            Err(RegistryError::ConnectionFailed("down".to_string()))
        }

        async fn disabled(&self) -> Result<Vec<String>, RegistryError> {
            Err(RegistryError::ConnectionFailed("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_disabled_node_takes_no_jobs() {
        let registry = MemoryWorkerRegistry::new();
        assert!(node_accepts_jobs(&registry, "worker1").await);

        registry.disable("worker1").await.unwrap();
        assert!(!node_accepts_jobs(&registry, "worker1").await);
        assert!(node_accepts_jobs(&registry, "worker2").await);

        registry.enable("worker1").await.unwrap();
        assert!(node_accepts_jobs(&registry, "worker1").await);
    }

    #[tokio::test]
    async fn test_unreadable_registry_does_not_stop_node() {
        assert!(node_accepts_jobs(&UnreachableRegistry, "worker1").await);
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis: cargo test -- --ignored
    async fn test_disabled_pool_leaves_jobs_queued() {
        let temp = TempDir::new().unwrap();
        let queue = Arc::new(
            JobQueue::connect("redis://localhost:6379/15", "test_disabled_pool")
                .await
                .expect("redis should be reachable"),
        );
        queue.clear().await.unwrap();

        let registry = Arc::new(MemoryWorkerRegistry::new());
        registry.disable("node-a").await.unwrap();

        let config = WorkerPoolConfig::new(1)
            .with_node_name("node-a")
            .with_poll_interval(Duration::from_millis(100));
        let runner = Arc::new(StructureRunner::new(PipelineConfig::default()));
        let mut pool = WorkerPool::with_queue(config, queue.clone(), runner, registry.clone());
        pool.start().await.unwrap();

        let job = Job::new(StructureTask::new(
            temp.path().join("missing.pdb"),
            temp.path().join("out"),
        ));
        queue.enqueue(&job).await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.len().await.unwrap(), 1);
        assert_eq!(queue.processing_len().await.unwrap(), 0);

        registry.enable("node-a").await.unwrap();
        let mut stored = None;
        for _ in 0..50 {
            stored = queue.get_result(job.id).await.unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(stored.expect("job should run once enabled").status, JobStatus::Failed);

        pool.shutdown().await.unwrap();
        queue.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_job_records_failure() {
        let temp = TempDir::new().unwrap();
        let runner = StructureRunner::new(PipelineConfig::default());
        let job = Job::new(StructureTask::new(
            temp.path().join("missing.pdb"),
            temp.path().join("out"),
        ));

        let result = execute_job(&runner, &job, "test-worker", Duration::from_secs(5)).await;

        assert_eq!(result.job_id, job.id);
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.worker_id, "test-worker");
        assert!(result.error.unwrap().contains("missing.pdb"));
    }
}
