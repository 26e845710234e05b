//! Domain-search result handling.
//!
//! - **parser**: reads the search tool's TSV output into per-structure summaries
//! - **summary**: the `.parsed` summary file format
//! - **aggregate**: cross-run statistics per organism

pub mod aggregate;
pub mod parser;
pub mod summary;

pub use aggregate::{
    aggregate_dir, merge_means, run_aggregation, write_category_summary, Aggregate,
    AggregateReport, Organism, ScoreStats, MEANS_FILE_NAME,
};
pub use parser::{parse_search_file, parse_to_summary, search_id, ParseReport, SearchSummary};
pub use summary::DomainSummary;

/// CSV writer with `\n` record terminators.
pub(crate) fn csv_writer<W: std::io::Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}
