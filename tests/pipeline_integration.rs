//! End-to-end pipeline tests against a stand-in search tool.
//!
//! The stand-in is a shell script that reads the first line of the input
//! structure to decide what to do:
//!
//! - `ok`: write a search table with two hits and a segment table
//! - `noresults`: exit cleanly without writing anything
//! - `nosegment`: write only the search table
//! - `fail`: print to stderr and exit with status 3
//! - `sleep`: write a search table, then hang for five seconds

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use domain_forge::error::{PipelineError, SearchError};
use domain_forge::pipeline::{BatchRunner, PipelineConfig, StructureOutcome, StructureRunner};
use domain_forge::results::{Organism, MEANS_FILE_NAME};
use domain_forge::scheduler::{execute_job, Job, JobStatus, StructureTask};
use tempfile::TempDir;

const FAKE_TOOL: &str = r#"#!/bin/sh
# args: easy-search <input> <db> <output-prefix> <tmp> [flags...]
input="$2"
out="$4"
mode=$(head -n 1 "$input")

write_search() {
    printf 'query\tchopping\tnres\tplddt\tc4\tc5\tc6\tc7\tc8\tc9\tc10\tc11\tc12\tc13\tc14\tmeta\n' > "${out}_search.tsv"
    printf 'q\t1-100\t100\t80.0\tx\tx\tx\tx\tx\tx\tx\tx\tx\tx\tx\t{"cath": "3.40.50.300"}\n' >> "${out}_search.tsv"
    printf 'q\t101-200\t100\t90.0\tx\tx\tx\tx\tx\tx\tx\tx\tx\tx\tx\t{"cath": "3.40.50.300"}\n' >> "${out}_search.tsv"
    printf 'q\t201-250\t50\tnot-a-number\tx\tx\tx\tx\tx\tx\tx\tx\tx\tx\tx\t{"cath": "1.10.8.10"}\n' >> "${out}_search.tsv"
}

case "$mode" in
    fail)
        echo "database not found" >&2
        exit 3
        ;;
    noresults)
        exit 0
        ;;
    nosegment)
        write_search
        ;;
    sleep)
        write_search
        sleep 5
        ;;
    *)
        write_search
        printf 'query\tdom_str\n' > "${out}_segment.tsv"
        ;;
esac
"#;

struct Fixture {
    temp: TempDir,
    runner: StructureRunner,
}

impl Fixture {
    fn new() -> Self {
        Self::with_tool_timeout(Duration::from_secs(30))
    }

    fn with_tool_timeout(timeout: Duration) -> Self {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("fake_search.sh");
        fs::write(&tool, FAKE_TOOL).unwrap();

        // Run through the shell so the freshly written script is never exec'd.
        let config = PipelineConfig::default()
            .with_interpreter(Some(PathBuf::from("/bin/sh")))
            .with_program(&tool)
            .with_database(temp.path().join("db"))
            .with_timeout(timeout);

        Self {
            temp,
            runner: StructureRunner::new(config),
        }
    }

    fn structure(&self, dir: &str, name: &str, mode: &str) -> PathBuf {
        let dir = self.temp.path().join(dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, format!("{}\nATOM      1  N   MET A   1\n", mode)).unwrap();
        path
    }

    fn output_dir(&self) -> PathBuf {
        self.temp.path().join("out")
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

#[tokio::test]
async fn test_structure_with_hits_is_parsed() {
    let fixture = Fixture::new();
    let pdb = fixture.structure("in", "AF-P1.pdb", "ok");
    let out = fixture.output_dir();
    fs::create_dir_all(&out).unwrap();

    let outcome = fixture.runner.process(&pdb, &out).await.unwrap();

    let report = match outcome {
        StructureOutcome::Parsed(report) => report,
        other => panic!("expected parsed outcome, got {:?}", other),
    };
    assert_eq!(report.id, "AF-P1");
    assert_eq!(report.rows_valid, 2);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.mean_plddt, Some(85.0));

    assert!(out.join("AF-P1_search.tsv").is_file());
    assert!(out.join("AF-P1_segment.tsv").is_file());

    let parsed = read(&out.join("AF-P1.parsed"));
    let mut lines = parsed.lines();
    assert_eq!(lines.next(), Some("#AF-P1_search.tsv Results. mean plddt: 85"));
    assert_eq!(lines.next(), Some("cath_id,count"));
    assert_eq!(lines.next(), Some("3.40.50.300,2"));
    assert_eq!(lines.next(), None);

    assert!(!out.join("tmp").exists(), "scratch directory should be removed");
}

#[tokio::test]
async fn test_no_search_output_is_not_an_error() {
    let fixture = Fixture::new();
    let pdb = fixture.structure("in", "empty.pdb", "noresults");
    let out = fixture.output_dir();
    fs::create_dir_all(&out).unwrap();

    let outcome = fixture.runner.process(&pdb, &out).await.unwrap();

    assert!(matches!(outcome, StructureOutcome::NoResults));
    assert!(!out.join("empty.parsed").exists());
    assert!(!out.join("empty_search.tsv").exists());
}

#[tokio::test]
async fn test_missing_segment_output_is_an_error() {
    let fixture = Fixture::new();
    let pdb = fixture.structure("in", "half.pdb", "nosegment");
    let out = fixture.output_dir();
    fs::create_dir_all(&out).unwrap();

    let err = fixture.runner.process(&pdb, &out).await.unwrap_err();

    match err {
        PipelineError::MissingOutput { file, .. } => assert_eq!(file, "_segment.tsv"),
        other => panic!("expected missing output, got {:?}", other),
    }
    assert!(!out.join("half.parsed").exists());
}

#[tokio::test]
async fn test_tool_failure_surfaces_stderr() {
    let fixture = Fixture::new();
    let pdb = fixture.structure("in", "bad.pdb", "fail");
    let out = fixture.output_dir();
    fs::create_dir_all(&out).unwrap();

    let err = fixture.runner.process(&pdb, &out).await.unwrap_err();

    match err {
        PipelineError::Search(SearchError::ToolFailed { code, stderr }) => {
            assert_eq!(code, 3);
            assert_eq!(stderr, "database not found");
        }
        other => panic!("expected tool failure, got {:?}", other),
    }
    assert!(!out.join("tmp").exists());
}

#[tokio::test]
async fn test_tool_timeout_kills_and_cleans_up() {
    let fixture = Fixture::with_tool_timeout(Duration::from_secs(1));
    let pdb = fixture.structure("in", "slow.pdb", "sleep");
    let out = fixture.output_dir();
    fs::create_dir_all(&out).unwrap();

    let err = fixture.runner.process(&pdb, &out).await.unwrap_err();

    assert!(
        matches!(err, PipelineError::Search(SearchError::Timeout(_))),
        "expected timeout, got {:?}",
        err
    );
    assert!(!out.join("tmp").exists());
    assert!(!out.join("slow_search.tsv").exists());
}

#[tokio::test]
async fn test_job_timeout_removes_staging() {
    let fixture = Fixture::new();
    let pdb = fixture.structure("in", "slow.pdb", "sleep");
    let out = fixture.output_dir();
    fs::create_dir_all(&out).unwrap();
    let job = Job::new(StructureTask::new(&pdb, &out));

    let result = execute_job(&fixture.runner, &job, "test-worker-0", Duration::from_secs(1)).await;

    assert_eq!(result.status, JobStatus::Timeout);
    assert!(!out.join("tmp").join("slow").exists());
    assert!(!out.join("slow.parsed").exists());
}

#[tokio::test]
async fn test_stale_staging_is_not_read_as_results() {
    let fixture = Fixture::new();
    let pdb = fixture.structure("in", "stale.pdb", "noresults");
    let out = fixture.output_dir();
    let staging = out.join("tmp").join("stale");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("_search.tsv"), "left over from a killed run\n").unwrap();

    let outcome = fixture.runner.process(&pdb, &out).await.unwrap();

    assert!(matches!(outcome, StructureOutcome::NoResults));
    assert!(!out.join("stale.parsed").exists());
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_batch_run_aggregates_results() {
    let fixture = Fixture::new();
    fixture.structure("batch", "a.pdb", "ok");
    fixture.structure("batch", "b.pdb", "noresults");
    fixture.structure("batch", "c.pdb", "fail");
    fixture.structure("batch", "d.pdb", "ok");

    let out = fixture.output_dir();
    let means = out.join(MEANS_FILE_NAME);
    let organism = Organism::new("human").unwrap();

    let report = BatchRunner::new(fixture.runner.clone())
        .run(&fixture.temp.path().join("batch"), &out, &organism, &means)
        .await
        .unwrap();

    assert_eq!(report.total(), 4);
    assert_eq!(report.parsed, 2);
    assert_eq!(report.no_results, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].0.ends_with("c.pdb"));
    assert_eq!(report.aggregate.files_read, 2);

    assert_eq!(
        read(&out.join("human_cath_summary.csv")),
        "cath_id,count\n3.40.50.300,4\n"
    );
    assert_eq!(
        read(&means),
        "Organism,Mean_plDDT,StdDev_plDDT\nHuman,85,0\n"
    );
}

#[tokio::test]
async fn test_batch_runs_share_means_file() {
    let fixture = Fixture::new();
    fixture.structure("ecoli", "e.pdb", "ok");
    fixture.structure("human", "h.pdb", "ok");

    let means = fixture.temp.path().join(MEANS_FILE_NAME);
    let batch = BatchRunner::new(fixture.runner.clone());

    for label in ["human", "ecoli"] {
        batch
            .run(
                &fixture.temp.path().join(label),
                &fixture.temp.path().join(format!("out-{}", label)),
                &Organism::new(label).unwrap(),
                &means,
            )
            .await
            .unwrap();
    }

    let content = read(&means);
    let rows: Vec<&str> = content.lines().skip(1).collect();
    assert_eq!(rows, vec!["Ecoli,85,0", "Human,85,0"]);
}
