//! Enqueueing structure jobs for the worker pool.

use std::path::{absolute, Path};

use thiserror::Error;
use tracing::info;

use super::job::{Job, StructureTask};
use super::queue::{JobQueue, QueueError};
use crate::error::PipelineError;
use crate::pipeline::discover_structures;

/// Errors raised while dispatching jobs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds one job per structure found under `input`.
///
/// Paths are made absolute so that workers on other nodes resolve them
/// against the same shared filesystem.
pub fn build_jobs(input: &Path, results_dir: &Path) -> Result<Vec<Job>, DispatchError> {
    let structures = discover_structures(input)?;
    let results_dir = absolute(results_dir)?;

    structures
        .into_iter()
        .map(|pdb| -> Result<Job, DispatchError> {
            Ok(Job::new(StructureTask::new(absolute(&pdb)?, results_dir.clone())))
        })
        .collect()
}

/// Enqueues one job per structure and returns the enqueued jobs.
pub async fn dispatch(
    queue: &JobQueue,
    input: &Path,
    results_dir: &Path,
) -> Result<Vec<Job>, DispatchError> {
    tokio::fs::create_dir_all(results_dir).await?;
    let jobs = build_jobs(input, results_dir)?;
    queue.enqueue_batch(&jobs).await?;

    info!(
        count = jobs.len(),
        queue = queue.queue_name(),
        results = %results_dir.display(),
        "Jobs dispatched"
    );
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_jobs_one_per_structure() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("a.pdb"), "ATOM").unwrap();
        fs::write(input.join("b.pdb"), "ATOM").unwrap();
        fs::write(input.join("readme.md"), "x").unwrap();

        let results = temp.path().join("results");
        let jobs = build_jobs(&input, &results).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].task.pdb_path, input.join("a.pdb"));
        assert_eq!(jobs[1].task.pdb_path, input.join("b.pdb"));
        assert!(jobs.iter().all(|j| j.task.output_dir == results));
        assert_ne!(jobs[0].id, jobs[1].id);
    }

    #[test]
    fn test_build_jobs_without_structures() {
        let temp = TempDir::new().unwrap();
        let err = build_jobs(temp.path(), temp.path()).unwrap_err();
        assert!(matches!(err, DispatchError::Pipeline(PipelineError::NoInputs(_))));
    }
}
