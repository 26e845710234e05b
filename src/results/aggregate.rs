//! Cross-run aggregation of `.parsed` summaries.
//!
//! Produces two artifacts per organism:
//!
//! - `<organism>_cath_summary.csv`: CATH id occurrences summed over all
//!   summaries in the results directory.
//! - a shared means file (`plDDT_means.csv`) holding one row per organism with
//!   the mean and sample standard deviation of the per-structure mean pLDDT.
//!   Rows for other organisms are preserved when the file is rewritten.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use statrs::statistics::Statistics;
use tracing::{debug, error, info, warn};

use super::summary::{DomainSummary, SUMMARY_EXTENSION};
use crate::error::AggregateError;

/// Default file name of the shared means file.
pub const MEANS_FILE_NAME: &str = "plDDT_means.csv";

const MEANS_HEADER: [&str; 3] = ["Organism", "Mean_plDDT", "StdDev_plDDT"];
const CATEGORY_HEADER: [&str; 2] = ["cath_id", "count"];

/// Label used to partition aggregate statistics (e.g. `human`, `ecoli`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Organism(String);

impl Organism {
    /// Creates an organism label, lower-casing the input.
    pub fn new(label: &str) -> Result<Self, AggregateError> {
        let label = label.trim().to_lowercase();
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AggregateError::InvalidOrganism(label));
        }
        Ok(Self(label))
    }

    /// The lower-case label.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label with its first character upper-cased, as stored in the means file.
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl FromStr for Organism {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mean and sample standard deviation of a set of scores.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl ScoreStats {
    /// Computes statistics over `values`.
    ///
    /// Empty input yields zeros; a single value has zero deviation.
    pub fn from_values(values: &[f64]) -> Self {
        match values.len() {
            0 => Self::default(),
            1 => Self {
                count: 1,
                mean: values[0],
                std_dev: 0.0,
            },
            n => Self {
                count: n,
                mean: values.iter().mean(),
                std_dev: values.iter().std_dev(),
            },
        }
    }
}

/// Totals collected from a results directory.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Summary files that were read successfully.
    pub files: Vec<PathBuf>,
    /// Summary files skipped because they could not be read.
    pub skipped_files: Vec<PathBuf>,
    /// Per-structure mean pLDDT values.
    pub means: Vec<f64>,
    /// CATH id occurrences summed over all summaries.
    pub counts: BTreeMap<String, u64>,
}

impl Aggregate {
    /// Statistics over the per-structure means.
    pub fn stats(&self) -> ScoreStats {
        ScoreStats::from_values(&self.means)
    }

    fn absorb(&mut self, summary: DomainSummary) {
        if let Some(mean) = summary.mean_plddt {
            self.means.push(mean);
        }
        for (cath, count) in summary.counts {
            *self.counts.entry(cath).or_insert(0) += count;
        }
    }
}

/// Files written by [`run_aggregation`].
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub organism: Organism,
    pub summary_path: PathBuf,
    pub means_path: PathBuf,
    pub files_read: usize,
    pub files_skipped: usize,
    pub categories: usize,
    pub stats: ScoreStats,
}

/// Lists `*.parsed` files directly inside `dir`, sorted by name.
pub fn summary_files(dir: &Path) -> Result<Vec<PathBuf>, AggregateError> {
    if !dir.is_dir() {
        return Err(AggregateError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(SUMMARY_EXTENSION)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Reads every summary in `dir`; unreadable files are logged and skipped.
pub fn aggregate_dir(dir: &Path) -> Result<Aggregate, AggregateError> {
    let mut aggregate = Aggregate::default();

    for path in summary_files(dir)? {
        match DomainSummary::read_from(&path) {
            Ok(summary) => {
                debug!(path = %path.display(), domains = summary.total_domains(), "Read summary");
                aggregate.absorb(summary);
                aggregate.files.push(path);
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error processing summary file");
                aggregate.skipped_files.push(path);
            }
        }
    }

    Ok(aggregate)
}

/// Path of the category summary for `organism` inside `dir`.
pub fn category_summary_path(dir: &Path, organism: &Organism) -> PathBuf {
    dir.join(format!("{}_cath_summary.csv", organism.as_str()))
}

/// Writes `<organism>_cath_summary.csv`, rows sorted by CATH id.
pub fn write_category_summary(
    dir: &Path,
    organism: &Organism,
    counts: &BTreeMap<String, u64>,
) -> Result<PathBuf, AggregateError> {
    let path = category_summary_path(dir, organism);
    let mut writer = super::csv_writer(fs::File::create(&path)?);
    writer.write_record(CATEGORY_HEADER)?;
    for (cath, count) in counts {
        writer.write_record([cath.as_str(), count.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(path)
}

/// One row of the means file, values kept verbatim.
#[derive(Debug, Clone, PartialEq)]
struct MeansRow {
    organism: String,
    mean: String,
    std_dev: String,
}

/// Merges `stats` for `organism` into the means file at `path`.
///
/// Existing rows for other organisms are kept as they are; the organism's own
/// row is replaced. The file is rewritten sorted by organism.
pub fn merge_means(path: &Path, organism: &Organism, stats: &ScoreStats) -> Result<(), AggregateError> {
    let mut rows = if path.exists() {
        read_means(path)?
    } else {
        BTreeMap::new()
    };

    rows.insert(
        organism.as_str().to_string(),
        MeansRow {
            organism: organism.display_name(),
            mean: stats.mean.to_string(),
            std_dev: stats.std_dev.to_string(),
        },
    );

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = super::csv_writer(fs::File::create(&tmp_path)?);
        writer.write_record(MEANS_HEADER)?;
        for row in rows.values() {
            writer.write_record([&row.organism, &row.mean, &row.std_dev])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads the means file keyed by lower-cased organism.
fn read_means(path: &Path) -> Result<BTreeMap<String, MeansRow>, AggregateError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut rows = BTreeMap::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable row in means file");
                continue;
            }
        };
        if record.len() != MEANS_HEADER.len() || record[0].trim().is_empty() {
            warn!(path = %path.display(), row = ?record, "Dropping malformed means row");
            continue;
        }
        rows.insert(
            record[0].trim().to_lowercase(),
            MeansRow {
                organism: record[0].trim().to_string(),
                mean: record[1].to_string(),
                std_dev: record[2].to_string(),
            },
        );
    }
    Ok(rows)
}

/// Aggregates `dir` and writes both the category summary and the means row.
pub fn run_aggregation(
    dir: &Path,
    organism: &Organism,
    means_path: &Path,
) -> Result<AggregateReport, AggregateError> {
    info!(organism = %organism, dir = %dir.display(), "Aggregating results");

    let aggregate = aggregate_dir(dir)?;
    let summary_path = write_category_summary(dir, organism, &aggregate.counts)?;
    info!(path = %summary_path.display(), "Generated category summary");

    let stats = aggregate.stats();
    merge_means(means_path, organism, &stats)?;
    info!(
        path = %means_path.display(),
        mean = stats.mean,
        std_dev = stats.std_dev,
        structures = stats.count,
        "Updated means file"
    );

    Ok(AggregateReport {
        organism: organism.clone(),
        summary_path,
        means_path: means_path.to_path_buf(),
        files_read: aggregate.files.len(),
        files_skipped: aggregate.skipped_files.len(),
        categories: aggregate.counts.len(),
        stats,
    })
}
