//! Per-structure `.parsed` summary files.
//!
//! A summary is a comment line carrying the mean pLDDT of the structure's
//! domains, followed by a two-column `cath_id,count` table:
//!
//! ```text
//! #AF-P12345_search.tsv Results. mean plddt: 71.5
//! cath_id,count
//! 1.10.8.10,2
//! 3.40.50.300,1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::warn;

use crate::error::ParseError;

/// Extension used for per-structure summary files.
pub const SUMMARY_EXTENSION: &str = "parsed";

const MEAN_MARKER: &str = "mean plddt:";
const TABLE_HEADER: [&str; 2] = ["cath_id", "count"];

/// Summary of one structure's domain-search results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomainSummary {
    /// Name of the search file the summary was derived from.
    pub search_file: String,
    /// Mean pLDDT over the structure's domains, if recorded.
    pub mean_plddt: Option<f64>,
    /// Domain occurrences keyed by CATH id.
    pub counts: BTreeMap<String, u64>,
}

impl DomainSummary {
    /// Writes the summary in `.parsed` format, rows sorted by CATH id.
    pub fn write_to(&self, path: &Path) -> Result<(), ParseError> {
        let mut file = fs::File::create(path)?;
        writeln!(
            file,
            "#{} Results. {} {}",
            self.search_file,
            MEAN_MARKER,
            self.mean_plddt.unwrap_or(0.0)
        )?;

        let mut writer = super::csv_writer(file);
        writer.write_record(TABLE_HEADER)?;
        for (cath, count) in &self.counts {
            writer.write_record([cath.as_str(), count.to_string().as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a `.parsed` file.
    ///
    /// Count rows with the wrong number of columns or a non-integer count are
    /// skipped with a warning. A missing or unreadable mean line leaves
    /// `mean_plddt` unset without discarding the counts.
    pub fn read_from(path: &Path) -> Result<Self, ParseError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ParseError::NotFound(path.to_path_buf()),
            _ => ParseError::Io(e),
        })?;

        let mut summary = DomainSummary::default();
        let body = match content.lines().next() {
            Some(first) if first.starts_with('#') => {
                let (search_file, mean) = parse_comment_line(first);
                summary.search_file = search_file;
                summary.mean_plddt = mean;
                if mean.is_none() {
                    warn!(path = %path.display(), line = first, "No mean plddt in summary header");
                }
                content.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
            }
            _ => {
                warn!(path = %path.display(), "Summary file has no comment line");
                content.as_str()
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());

        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable row in summary");
                    continue;
                }
            };

            if record.iter().eq(TABLE_HEADER) {
                continue;
            }
            if record.len() != 2 {
                warn!(path = %path.display(), row = ?record, "Invalid row format in summary");
                continue;
            }
            match record[1].trim().parse::<u64>() {
                Ok(count) => {
                    *summary.counts.entry(record[0].to_string()).or_insert(0) += count;
                }
                Err(_) => {
                    warn!(path = %path.display(), row = ?record, "Invalid count in summary");
                }
            }
        }

        Ok(summary)
    }

    /// Total number of domain occurrences in the summary.
    pub fn total_domains(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Splits `#<file> Results. mean plddt: <value>` into its parts.
fn parse_comment_line(line: &str) -> (String, Option<f64>) {
    let text = line.trim_start_matches('#').trim();
    let search_file = text
        .split_once(" Results.")
        .map(|(name, _)| name)
        .unwrap_or(text)
        .to_string();
    let mean = text
        .split_once(MEAN_MARKER)
        .and_then(|(_, value)| value.trim().parse::<f64>().ok());
    (search_file, mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> DomainSummary {
        let mut counts = BTreeMap::new();
        counts.insert("3.40.50.300".to_string(), 1);
        counts.insert("1.10.8.10".to_string(), 2);
        DomainSummary {
            search_file: "example_search.tsv".to_string(),
            mean_plddt: Some(60.25),
            counts,
        }
    }

    #[test]
    fn test_write_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("example.parsed");
        sample().write_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "#example_search.tsv Results. mean plddt: 60.25\n\
             cath_id,count\n\
             1.10.8.10,2\n\
             3.40.50.300,1\n"
        );
    }

    #[test]
    fn test_read_written_summary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("example.parsed");
        sample().write_to(&path).unwrap();

        let read = DomainSummary::read_from(&path).unwrap();
        assert_eq!(read, sample());
        assert_eq!(read.total_domains(), 3);
    }

    #[test]
    fn test_read_skips_malformed_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.parsed");
        fs::write(
            &path,
            "#bad_search.tsv Results. mean plddt: 50.0\n\
             cath_id,count\n\
             1abc,3\n\
             2xyz\n\
             3def,many\n\
             4ghi,1,extra\n\
             5jkl,2\n",
        )
        .unwrap();

        let summary = DomainSummary::read_from(&path).unwrap();
        assert_eq!(summary.mean_plddt, Some(50.0));
        assert_eq!(summary.counts.len(), 2);
        assert_eq!(summary.counts["1abc"], 3);
        assert_eq!(summary.counts["5jkl"], 2);
    }

    #[test]
    fn test_read_without_mean_keeps_counts() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nomean.parsed");
        fs::write(&path, "#nomean_search.tsv Results.\ncath_id,count\n1abc,4\n").unwrap();

        let summary = DomainSummary::read_from(&path).unwrap();
        assert!(summary.mean_plddt.is_none());
        assert_eq!(summary.search_file, "nomean_search.tsv");
        assert_eq!(summary.counts["1abc"], 4);
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = DomainSummary::read_from(&temp.path().join("absent.parsed")).unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn test_parse_comment_line() {
        let (name, mean) = parse_comment_line("#x_search.tsv Results. mean plddt: 71.5");
        assert_eq!(name, "x_search.tsv");
        assert_eq!(mean, Some(71.5));

        let (_, mean) = parse_comment_line("#x_search.tsv Results. mean plddt: n/a");
        assert!(mean.is_none());
    }
}
