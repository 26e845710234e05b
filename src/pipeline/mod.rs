//! Domain-search pipeline over PDB structures.
//!
//! # Components
//!
//! - **Search**: invokes the external domain-search tool for one structure
//! - **Runner**: search, rename outputs, parse, and clean up for one structure
//! - **Batch**: runs every structure in a directory, then aggregates
//! - **Config**: tool paths and run settings, loaded from the environment
//!
//! # Flow
//!
//! ```text
//! <id>.pdb ──► search tool ──► _search.tsv / _segment.tsv
//!                                   │ rename
//!                                   ▼
//!                   <id>_search.tsv / <id>_segment.tsv
//!                                   │ parse
//!                                   ▼
//!                              <id>.parsed ──► aggregate ──► <organism>_cath_summary.csv
//!                                                        └──► plDDT_means.csv
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_forge::pipeline::{BatchRunner, PipelineConfig, StructureRunner};
//! use domain_forge::results::Organism;
//!
//! let runner = StructureRunner::new(PipelineConfig::from_env()?);
//! let batch = BatchRunner::new(runner);
//! let report = batch
//!     .run(input_dir, output_dir, &Organism::new("human")?, &means_path)
//!     .await?;
//! println!("{} parsed, {} failed", report.parsed, report.failed.len());
//! ```

pub mod batch;
pub mod config;
pub mod runner;
pub mod search;

pub use batch::{discover_structures, BatchReport, BatchRunner};
pub use config::{ConfigError, PipelineConfig};
pub use runner::{structure_id, OutcomeKind, StructureOutcome, StructureRunner};
pub use search::{SearchInvocation, SearchTool, SearchToolConfig, ToolOutput};
