//! Job definitions for the scheduler.
//!
//! - `StructureTask`: the structure to process and where to write results
//! - `Job`: a queued unit of work wrapping a task
//! - `JobResult`: result of job execution, stored back in Redis
//! - `JobStatus`: final status of a job

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::OutcomeKind;

/// One structure to run through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructureTask {
    /// Input PDB file, on storage shared with the workers.
    pub pdb_path: PathBuf,
    /// Directory receiving the search outputs and `.parsed` summary.
    pub output_dir: PathBuf,
}

impl StructureTask {
    pub fn new(pdb_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pdb_path: pdb_path.into(),
            output_dir: output_dir.into(),
        }
    }
}

/// A job representing a unit of work to be executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: Uuid,
    /// The structure to process.
    pub task: StructureTask,
    /// When this job was created.
    pub created_at: DateTime<Utc>,
    /// Number of times this job has been picked up by a worker.
    pub attempts: u32,
}

impl Job {
    pub fn new(task: StructureTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Increments the attempt counter.
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }
}

/// Status of a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// The pipeline ran to completion.
    Completed,
    /// The search tool found nothing for the structure.
    NoResults,
    /// The pipeline returned an error.
    Failed,
    /// Execution exceeded the job timeout.
    Timeout,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::NoResults => write!(f, "no_results"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// ID of the job that was executed.
    pub job_id: Uuid,
    /// Final status of the job.
    pub status: JobStatus,
    /// Pipeline outcome when the run finished.
    pub outcome: Option<OutcomeKind>,
    /// Error message if the job failed.
    pub error: Option<String>,
    /// ID of the worker that processed this job.
    pub worker_id: String,
    /// Duration of the execution in milliseconds.
    pub duration_ms: u64,
    /// When the job was completed.
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Creates a result from a finished pipeline run.
    pub fn finished(
        job_id: Uuid,
        worker_id: impl Into<String>,
        outcome: OutcomeKind,
        duration_ms: u64,
    ) -> Self {
        let status = match outcome {
            OutcomeKind::NoResults => JobStatus::NoResults,
            OutcomeKind::Parsed | OutcomeKind::Empty => JobStatus::Completed,
        };
        Self {
            job_id,
            status,
            outcome: Some(outcome),
            error: None,
            worker_id: worker_id.into(),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    /// Creates a new failed job result.
    pub fn failure(
        job_id: Uuid,
        worker_id: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            outcome: None,
            error: Some(error.into()),
            worker_id: worker_id.into(),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    /// Creates a new timeout job result.
    pub fn timeout(job_id: Uuid, worker_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            job_id,
            status: JobStatus::Timeout,
            outcome: None,
            error: Some("Job execution timed out".to_string()),
            worker_id: worker_id.into(),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    /// Returns whether the pipeline ran without error.
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::NoResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_job() -> Job {
        Job::new(StructureTask::new("/data/AF-P1.pdb", "/results/human"))
    }

    #[test]
    fn test_job_new() {
        let job = create_test_job();

        assert!(!job.id.is_nil());
        assert_eq!(job.attempts, 0);
        assert_eq!(job.task.pdb_path, PathBuf::from("/data/AF-P1.pdb"));
        assert_eq!(job.task.output_dir, PathBuf::from("/results/human"));
    }

    #[test]
    fn test_job_increment_attempts() {
        let mut job = create_test_job();
        job.increment_attempts();
        job.increment_attempts();
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn test_job_wire_format() {
        let job = create_test_job();
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["task"]["pdb_path"], "/data/AF-P1.pdb");
        assert_eq!(value["task"]["output_dir"], "/results/human");
        assert_eq!(value["attempts"], 0);

        let parsed: Job = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.task, job.task);
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(format!("{}", JobStatus::Completed), "completed");
        assert_eq!(format!("{}", JobStatus::NoResults), "no_results");
        assert_eq!(format!("{}", JobStatus::Failed), "failed");
        assert_eq!(format!("{}", JobStatus::Timeout), "timeout");
    }

    #[test]
    fn test_job_result_finished() {
        let job_id = Uuid::new_v4();

        let result = JobResult::finished(job_id, "node1-worker-0", OutcomeKind::Parsed, 5000);
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.outcome, Some(OutcomeKind::Parsed));
        assert!(result.error.is_none());
        assert!(result.is_success());

        let result = JobResult::finished(job_id, "node1-worker-0", OutcomeKind::NoResults, 10);
        assert_eq!(result.status, JobStatus::NoResults);
        assert!(result.is_success());
    }

    #[test]
    fn test_job_result_failure() {
        let job_id = Uuid::new_v4();
        let result = JobResult::failure(job_id, "worker-2", "Search failed", 3000);

        assert_eq!(result.job_id, job_id);
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.outcome.is_none());
        assert_eq!(result.error, Some("Search failed".to_string()));
        assert!(!result.is_success());
    }

    #[test]
    fn test_job_result_timeout() {
        let result = JobResult::timeout(Uuid::new_v4(), "worker-3", 30000);

        assert_eq!(result.status, JobStatus::Timeout);
        assert!(result.error.is_some());
        assert!(!result.is_success());
    }
}
