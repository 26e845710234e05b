//! Error types for domain-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Domain-search tool invocation
//! - Per-structure pipeline runs
//! - Search result parsing and aggregation
//! - Cluster inventory generation
//! - Disabled-worker registry
//! - Alert actions

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while invoking the external domain-search tool.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Domain search exited with code {code}: {stderr}")]
    ToolFailed { code: i32, stderr: String },

    #[error("Domain search timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running the pipeline over a structure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input structure not found: {0}")]
    InputNotFound(PathBuf),

    #[error("No PDB files found in {0}")]
    NoInputs(PathBuf),

    #[error("Expected output '{file}' not found in {dir}")]
    MissingOutput { file: String, dir: PathBuf },

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while parsing search or summary files.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("File {0} not found")]
    NotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while aggregating summaries.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Results directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Invalid organism label '{0}': must be non-empty and contain only lowercase letters, digits, '-' or '_'")]
    InvalidOrganism(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while building a host inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Could not run 'terraform output -json': {0}")]
    TerraformFailed(String),

    #[error("Could not parse Terraform outputs as JSON: {0}")]
    InvalidOutputs(#[source] serde_json::Error),

    #[error("No {0} found")]
    MissingNodes(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the disabled-worker registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Action must be 'disable' or 'enable', got '{0}'")]
    InvalidAction(String),
}

/// Errors that can occur while acting on an alert.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Playbook {playbook} exited with code {code}")]
    PlaybookFailed { playbook: PathBuf, code: i32 },

    #[error("Worker registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Could not lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
