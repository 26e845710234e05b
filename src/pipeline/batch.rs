//! Sequential batch runs over a directory of structures.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, info};

use super::runner::{OutcomeKind, StructureRunner};
use crate::error::PipelineError;
use crate::results::{run_aggregation, AggregateReport, Organism};

const PDB_EXTENSION: &str = "pdb";

/// Finds the structures to process.
///
/// `input` may be a single `.pdb` file or a directory whose top-level `.pdb`
/// files are returned sorted by name.
pub fn discover_structures(input: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(PipelineError::InputNotFound(input.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(PDB_EXTENSION))
        })
        .collect();

    if files.is_empty() {
        return Err(PipelineError::NoInputs(input.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Counts from a batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Structures that produced a `.parsed` summary.
    pub parsed: usize,
    /// Structures whose search output held no valid rows.
    pub empty: usize,
    /// Structures for which the tool produced no results.
    pub no_results: usize,
    /// Structures that failed, with the failure reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Aggregation written after all structures were processed.
    pub aggregate: AggregateReport,
    /// Wall time of the whole batch.
    pub duration: Duration,
}

impl BatchReport {
    /// Total number of structures attempted.
    pub fn total(&self) -> usize {
        self.parsed + self.empty + self.no_results + self.failed.len()
    }
}

/// Runs the pipeline over every structure, then aggregates.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    runner: StructureRunner,
}

impl BatchRunner {
    pub fn new(runner: StructureRunner) -> Self {
        Self { runner }
    }

    /// Processes `input` into `output_dir` and aggregates for `organism`.
    ///
    /// Per-structure failures are logged and counted; they do not stop the
    /// batch. Missing inputs and aggregation failures are returned as errors.
    pub async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        organism: &Organism,
        means_path: &Path,
    ) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        let structures = discover_structures(input)?;
        tokio::fs::create_dir_all(output_dir).await?;

        info!(
            count = structures.len(),
            input = %input.display(),
            output = %output_dir.display(),
            organism = %organism,
            "Starting batch"
        );

        let (mut parsed, mut empty, mut no_results) = (0, 0, 0);
        let mut failed = Vec::new();

        for (index, path) in structures.iter().enumerate() {
            info!(
                file = %path.display(),
                progress = %format!("{}/{}", index + 1, structures.len()),
                "Processing structure"
            );
            match self.runner.process(path, output_dir).await {
                Ok(outcome) => match outcome.kind() {
                    OutcomeKind::Parsed => parsed += 1,
                    OutcomeKind::Empty => empty += 1,
                    OutcomeKind::NoResults => no_results += 1,
                },
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Pipeline failed for structure");
                    failed.push((path.clone(), e.to_string()));
                }
            }
        }

        let aggregate = run_aggregation(output_dir, organism, means_path)?;

        let report = BatchReport {
            parsed,
            empty,
            no_results,
            failed,
            aggregate,
            duration: start.elapsed(),
        };

        info!(
            total = report.total(),
            parsed = report.parsed,
            empty = report.empty,
            no_results = report.no_results,
            failed = report.failed.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Batch complete"
        );

        Ok(report)
    }
}
