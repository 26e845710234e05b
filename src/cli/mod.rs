//! Command-line interface for domain-forge.
//!
//! Provides commands for local pipeline runs, result parsing and aggregation,
//! job dispatch, worker pools, inventory generation, and the alert webhook.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, InventoryFormat};
