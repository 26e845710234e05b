//! domain-forge: protein domain search pipeline for PDB structures.
//!
//! This library runs an external domain-search tool over PDB files, parses
//! its hits into per-structure CATH summaries, aggregates those per organism,
//! and provides the Redis-backed queue, worker pool, and alert-driven control
//! plane used to run it across a cluster.

// Core modules
pub mod alerts;
pub mod cli;
pub mod cluster;
pub mod error;
pub mod pipeline;
pub mod results;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{
    AggregateError, AlertError, InventoryError, ParseError, PipelineError, RegistryError,
    SearchError,
};
