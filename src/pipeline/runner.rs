//! Per-structure pipeline run.
//!
//! One structure goes through:
//!
//! 1. domain search into a private staging directory `<output>/tmp/<id>/`
//! 2. rename of `_search.tsv` / `_segment.tsv` to `<id>_search.tsv` /
//!    `<id>_segment.tsv` in the output directory
//! 3. parsing of `<id>_search.tsv` into `<id>.parsed`
//! 4. removal of the staging directory
//!
//! A structure for which the tool produced no `_search.tsv` has no results;
//! that is not an error and the parse step is skipped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::search::{SearchInvocation, SearchTool};
use crate::error::PipelineError;
use crate::results::{parse_to_summary, ParseReport};

/// Name of the scratch directory created inside the output directory.
pub const TMP_DIR_NAME: &str = "tmp";

/// Result of running the pipeline over one structure.
#[derive(Debug, Clone)]
pub enum StructureOutcome {
    /// Search results were found and parsed.
    Parsed(ParseReport),
    /// The tool produced no search results for this structure.
    NoResults,
}

impl StructureOutcome {
    /// Path of the written summary, if any.
    pub fn summary_path(&self) -> Option<&Path> {
        match self {
            StructureOutcome::Parsed(report) => report.parsed_path.as_deref(),
            StructureOutcome::NoResults => None,
        }
    }

    /// Short label used in logs and job results.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            StructureOutcome::Parsed(report) if report.parsed_path.is_some() => OutcomeKind::Parsed,
            StructureOutcome::Parsed(_) => OutcomeKind::Empty,
            StructureOutcome::NoResults => OutcomeKind::NoResults,
        }
    }
}

/// Coarse classification of a [`StructureOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A `.parsed` summary was written.
    Parsed,
    /// Search output existed but held no valid rows.
    Empty,
    /// The tool produced no search output.
    NoResults,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Parsed => write!(f, "parsed"),
            OutcomeKind::Empty => write!(f, "empty"),
            OutcomeKind::NoResults => write!(f, "no_results"),
        }
    }
}

/// Structure identifier: the file name without its extension.
pub fn structure_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "structure".to_string())
}

/// Runs the pipeline for individual structures.
#[derive(Debug, Clone)]
pub struct StructureRunner {
    tool: SearchTool,
    keep_tmp: bool,
}

impl StructureRunner {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            tool: SearchTool::new(config.search),
            keep_tmp: config.keep_tmp,
        }
    }

    pub fn tool(&self) -> &SearchTool {
        &self.tool
    }

    /// Runs search, rename, and parse for `pdb_path`, writing into `output_dir`.
    pub async fn process(
        &self,
        pdb_path: &Path,
        output_dir: &Path,
    ) -> Result<StructureOutcome, PipelineError> {
        if !pdb_path.is_file() {
            return Err(PipelineError::InputNotFound(pdb_path.to_path_buf()));
        }

        let id = structure_id(pdb_path);
        let staging = output_dir.join(TMP_DIR_NAME).join(&id);
        let invocation = SearchInvocation {
            input: pdb_path.to_path_buf(),
            output_dir: staging.clone(),
            tmp_dir: staging.join("work"),
        };

        // Leftovers from an interrupted run must not be read as results.
        match tokio::fs::remove_dir_all(&staging).await {
            Ok(()) => debug!(dir = %staging.display(), "Removed stale staging directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let guard = StagingGuard::new(staging, self.keep_tmp);
        tokio::fs::create_dir_all(&invocation.tmp_dir).await?;
        debug!(id = %id, staging = %guard.dir.display(), "Using staging directory");

        let result = self.search_and_parse(&id, &invocation, output_dir).await;
        drop(guard);

        match &result {
            Ok(outcome) => info!(id = %id, outcome = %outcome.kind(), "Structure processed"),
            Err(e) => warn!(id = %id, error = %e, "Structure failed"),
        }
        result
    }

    async fn search_and_parse(
        &self,
        id: &str,
        invocation: &SearchInvocation,
        output_dir: &Path,
    ) -> Result<StructureOutcome, PipelineError> {
        self.tool.run(invocation).await?;

        let staged_search = invocation.search_output();
        if !tokio::fs::try_exists(&staged_search).await.unwrap_or(false) {
            warn!(id = %id, dir = %invocation.output_dir.display(), "No search results produced");
            return Ok(StructureOutcome::NoResults);
        }

        let staged_segment = invocation.segment_output();
        if !tokio::fs::try_exists(&staged_segment).await.unwrap_or(false) {
            return Err(PipelineError::MissingOutput {
                file: super::search::SEGMENT_OUTPUT.to_string(),
                dir: invocation.output_dir.clone(),
            });
        }

        let search_path = output_dir.join(format!("{}_search.tsv", id));
        let segment_path = output_dir.join(format!("{}_segment.tsv", id));
        tokio::fs::rename(&staged_search, &search_path).await?;
        debug!(to = %search_path.display(), "Renamed search output");
        tokio::fs::rename(&staged_segment, &segment_path).await?;
        debug!(to = %segment_path.display(), "Renamed segment output");

        let report = parse_to_summary(&search_path, output_dir)?;
        Ok(StructureOutcome::Parsed(report))
    }
}

/// Removes the staging directory when dropped, including when the
/// surrounding future is cancelled mid-run.
struct StagingGuard {
    dir: PathBuf,
    keep: bool,
}

impl StagingGuard {
    fn new(dir: PathBuf, keep: bool) -> Self {
        Self { dir, keep }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if !self.keep {
            remove_staging(&self.dir);
        }
    }
}

/// Removes a staging directory and, when it is empty, its `tmp` parent.
fn remove_staging(staging: &Path) {
    match std::fs::remove_dir_all(staging) {
        Ok(()) => debug!(dir = %staging.display(), "Temporary directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %staging.display(), error = %e, "Error removing temporary directory"),
    }
    if let Some(parent) = staging.parent() {
        // Fails while other structures still use the directory.
        let _ = std::fs::remove_dir(parent);
    }
}

/// Paths written for a structure with the given id.
pub fn output_paths(output_dir: &Path, id: &str) -> [PathBuf; 3] {
    [
        output_dir.join(format!("{}_search.tsv", id)),
        output_dir.join(format!("{}_segment.tsv", id)),
        output_dir.join(format!("{}.parsed", id)),
    ]
}
