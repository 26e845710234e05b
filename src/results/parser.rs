//! Parser for domain-search result tables.
//!
//! The search tool writes a tab-separated file with a single header line.
//! Column 3 holds the domain's pLDDT confidence score and column 15 a JSON
//! object with the domain's metadata, from which the `cath` classification is
//! taken. Malformed rows are skipped and logged; they never abort the file.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde_json::Value;
use statrs::statistics::Statistics;
use tracing::{debug, info, warn};

use super::summary::{DomainSummary, SUMMARY_EXTENSION};
use crate::error::ParseError;

/// Index of the pLDDT column in a search row.
pub const PLDDT_COLUMN: usize = 3;
/// Index of the JSON metadata column in a search row.
pub const METADATA_COLUMN: usize = 15;
/// Category used when the metadata carries no `cath` entry.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

const SEARCH_SUFFIX: &str = "_search.tsv";

/// Contents of a parsed search file.
#[derive(Debug, Clone, Default)]
pub struct SearchSummary {
    /// File name of the search table.
    pub search_file: String,
    /// Whether the file had no header line at all.
    pub header_missing: bool,
    /// pLDDT values of the valid rows, in file order.
    pub scores: Vec<f64>,
    /// Domain occurrences keyed by CATH id.
    pub counts: BTreeMap<String, u64>,
    /// Number of data rows skipped as malformed.
    pub rows_skipped: usize,
}

impl SearchSummary {
    /// Number of rows that contributed to the summary.
    pub fn rows_valid(&self) -> usize {
        self.scores.len()
    }

    /// Mean pLDDT of the valid rows, `None` when there are none.
    pub fn mean_plddt(&self) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.iter().mean())
        }
    }

    /// Converts into the per-structure summary written to disk.
    pub fn to_domain_summary(&self) -> DomainSummary {
        DomainSummary {
            search_file: self.search_file.clone(),
            mean_plddt: self.mean_plddt(),
            counts: self.counts.clone(),
        }
    }
}

/// Outcome of parsing one search file into a summary.
#[derive(Debug, Clone)]
pub struct ParseReport {
    /// Structure identifier derived from the search file name.
    pub id: String,
    /// Path of the written `.parsed` file, `None` when no valid rows existed.
    pub parsed_path: Option<PathBuf>,
    /// Number of rows that contributed to the summary.
    pub rows_valid: usize,
    /// Number of rows skipped as malformed.
    pub rows_skipped: usize,
    /// Mean pLDDT of the valid rows.
    pub mean_plddt: Option<f64>,
}

/// Derives the structure id from a search file name.
///
/// `AF-P1_search.tsv` becomes `AF-P1`; any other name loses its extension.
pub fn search_id(file_name: &str) -> String {
    match file_name.strip_suffix(SEARCH_SUFFIX) {
        Some(id) => id.to_string(),
        None => Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string()),
    }
}

/// Reads a search table and tallies its valid rows.
pub fn parse_search_file(path: &Path) -> Result<SearchSummary, ParseError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ParseError::NotFound(path.to_path_buf()),
        _ => ParseError::Io(e),
    })?;

    let mut summary = SearchSummary {
        search_file: file_name(path),
        ..Default::default()
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(file);

    let mut records = reader.records();
    match records.next() {
        Some(Ok(_header)) => {}
        Some(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Unreadable header line");
        }
        None => {
            warn!(path = %path.display(), "No header found in search file");
            summary.header_missing = true;
            return Ok(summary);
        }
    }

    for record in records {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable row");
                summary.rows_skipped += 1;
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        if record.len() <= METADATA_COLUMN {
            warn!(line, columns = record.len(), "Row has insufficient columns");
            summary.rows_skipped += 1;
            continue;
        }

        let plddt = match record[PLDDT_COLUMN].trim().parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                warn!(line, value = &record[PLDDT_COLUMN], "Invalid plDDT value");
                summary.rows_skipped += 1;
                continue;
            }
        };

        let category = match domain_category(&record[METADATA_COLUMN]) {
            Some(category) => category,
            None => {
                warn!(line, content = &record[METADATA_COLUMN], "Invalid metadata");
                debug!(row = ?record, "Skipped row content");
                summary.rows_skipped += 1;
                continue;
            }
        };

        summary.scores.push(plddt);
        *summary.counts.entry(category).or_insert(0) += 1;
    }

    Ok(summary)
}

/// Extracts the CATH category from a metadata cell.
///
/// Returns `None` when the cell is not a JSON object.
fn domain_category(meta: &str) -> Option<String> {
    let value: Value = serde_json::from_str(meta.trim()).ok()?;
    let object = value.as_object()?;
    let category = match object.get("cath") {
        Some(Value::String(s)) => s.clone(),
        _ => UNKNOWN_CATEGORY.to_string(),
    };
    Some(category)
}

/// Parses `search_file` and writes `<id>.parsed` into `output_dir`.
///
/// Nothing is written when the file has no valid data rows.
pub fn parse_to_summary(search_file: &Path, output_dir: &Path) -> Result<ParseReport, ParseError> {
    let summary = parse_search_file(search_file)?;
    let id = search_id(&summary.search_file);

    let mut report = ParseReport {
        id: id.clone(),
        parsed_path: None,
        rows_valid: summary.rows_valid(),
        rows_skipped: summary.rows_skipped,
        mean_plddt: summary.mean_plddt(),
    };

    if summary.rows_valid() == 0 {
        info!(
            search_file = %summary.search_file,
            skipped = summary.rows_skipped,
            "No valid rows, skipping summary"
        );
        return Ok(report);
    }

    std::fs::create_dir_all(output_dir)?;
    let parsed_path = output_dir.join(format!("{}.{}", id, SUMMARY_EXTENSION));
    summary.to_domain_summary().write_to(&parsed_path)?;

    info!(
        search_file = %summary.search_file,
        parsed = %parsed_path.display(),
        rows = summary.rows_valid(),
        skipped = summary.rows_skipped,
        "Successfully parsed search file"
    );

    report.parsed_path = Some(parsed_path);
    Ok(report)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
