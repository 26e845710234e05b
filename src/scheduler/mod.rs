//! Distributed structure processing with a Redis queue and worker pools.
//!
//! - **JobQueue**: Redis-based job queue with reliable dequeue using BRPOPLPUSH
//! - **WorkerPool**: pool of workers running the structure pipeline per job
//! - **dispatch**: enqueues one job per structure in an input directory
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  dispatch    │
//!                      │   (CLI)      │
//!                      └──────┬───────┘
//!                             │
//!                      ┌──────▼───────┐        ┌──────────────────┐
//!                      │    Redis     │◄───────┤ disabled_workers │
//!                      │    Queue     │        └──────────────────┘
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ worker1 │         │ worker2 │         │ workerN │
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_forge::cluster::RedisWorkerRegistry;
//! use domain_forge::pipeline::{PipelineConfig, StructureRunner};
//! use domain_forge::scheduler::{dispatch, JobQueue, WorkerPool, WorkerPoolConfig};
//! use std::sync::Arc;
//!
//! let queue = JobQueue::connect("redis://localhost:6379/0", "structures").await?;
//! let jobs = dispatch(&queue, input_dir, results_dir).await?;
//!
//! let runner = Arc::new(StructureRunner::new(PipelineConfig::from_env()?));
//! let registry = Arc::new(RedisWorkerRegistry::connect(url, "disabled_workers").await?);
//! let mut pool = WorkerPool::new(WorkerPoolConfig::new(4), runner, registry).await?;
//! pool.start().await?;
//! pool.shutdown().await?;
//! ```

pub mod dispatch;
pub mod job;
pub mod queue;
pub mod worker_pool;

pub use dispatch::{build_jobs, dispatch, DispatchError};
pub use job::{Job, JobResult, JobStatus, StructureTask};
pub use queue::{JobQueue, QueueError, QueueStats};
pub use worker_pool::{
    execute_job, node_accepts_jobs, PoolError, PoolStats, Worker, WorkerPool, WorkerPoolConfig,
};
