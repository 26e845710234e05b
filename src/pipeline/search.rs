//! Invocation of the external domain-search tool.
//!
//! The tool (Merizo Search) is run in `easy-search` mode once per structure.
//! It writes `<output>_search.tsv` and `<output>_segment.tsv`; the output
//! argument is a directory with a trailing separator so both land inside it
//! as `_search.tsv` and `_segment.tsv`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::SearchError;

/// Primary output of a search run.
pub const SEARCH_OUTPUT: &str = "_search.tsv";
/// Secondary (segmentation) output of a search run.
pub const SEGMENT_OUTPUT: &str = "_segment.tsv";

/// Settings for the domain-search tool.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchToolConfig {
    /// Interpreter used to launch the tool, if it is a script.
    pub interpreter: Option<PathBuf>,
    /// The tool itself (script or executable).
    pub program: PathBuf,
    /// Path to the fold-classification database.
    pub database: PathBuf,
    /// Compute device passed via `-d`.
    pub device: String,
    /// Thread count passed via `--threads`.
    pub threads: u32,
    /// Whether to pass `--iterate`.
    pub iterate: bool,
    /// Whether to pass `--output_headers`.
    pub output_headers: bool,
    /// Maximum wall time for one run.
    pub timeout: Duration,
}

impl Default for SearchToolConfig {
    fn default() -> Self {
        Self {
            interpreter: Some(PathBuf::from("/opt/merizo_search/merizosearch_env/bin/python3")),
            program: PathBuf::from("/opt/merizo_search/merizo_search/merizo.py"),
            database: PathBuf::from(
                "/home/almalinux/merizo_search/examples/database/cath-4.3-foldclassdb",
            ),
            device: "cpu".to_string(),
            threads: 1,
            iterate: true,
            output_headers: true,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Paths for a single search run.
#[derive(Debug, Clone)]
pub struct SearchInvocation {
    /// Structure file to search.
    pub input: PathBuf,
    /// Directory receiving `_search.tsv` and `_segment.tsv`.
    pub output_dir: PathBuf,
    /// Scratch directory for the tool.
    pub tmp_dir: PathBuf,
}

impl SearchInvocation {
    /// Expected location of the primary output.
    pub fn search_output(&self) -> PathBuf {
        self.output_dir.join(SEARCH_OUTPUT)
    }

    /// Expected location of the segmentation output.
    pub fn segment_output(&self) -> PathBuf {
        self.output_dir.join(SEGMENT_OUTPUT)
    }
}

/// Captured result of a finished tool process.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runner for the domain-search tool.
#[derive(Debug, Clone)]
pub struct SearchTool {
    config: SearchToolConfig,
}

impl SearchTool {
    pub fn new(config: SearchToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchToolConfig {
        &self.config
    }

    /// Builds the program and argument list for `invocation`.
    pub fn command_line(&self, invocation: &SearchInvocation) -> (OsString, Vec<OsString>) {
        let mut args: Vec<OsString> = Vec::new();
        let program = match &self.config.interpreter {
            Some(interpreter) => {
                args.push(self.config.program.clone().into_os_string());
                interpreter.clone().into_os_string()
            }
            None => self.config.program.clone().into_os_string(),
        };

        args.push("easy-search".into());
        args.push(invocation.input.clone().into_os_string());
        args.push(self.config.database.clone().into_os_string());
        args.push(dir_prefix(&invocation.output_dir));
        args.push(invocation.tmp_dir.clone().into_os_string());
        if self.config.iterate {
            args.push("--iterate".into());
        }
        if self.config.output_headers {
            args.push("--output_headers".into());
        }
        args.push("-d".into());
        args.push(self.config.device.clone().into());
        args.push("--threads".into());
        args.push(self.config.threads.to_string().into());

        (program, args)
    }

    /// Runs the tool and waits for it to finish.
    ///
    /// A non-zero exit is reported as [`SearchError::ToolFailed`] carrying the
    /// captured standard error.
    pub async fn run(&self, invocation: &SearchInvocation) -> Result<ToolOutput, SearchError> {
        let (program, args) = self.command_line(invocation);
        info!(
            input = %invocation.input.display(),
            command = %display_command(&program, &args),
            "Running domain search"
        );

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SearchError::Spawn {
                program: program.to_string_lossy().to_string(),
                source,
            })?;

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result?,
            Err(_) => return Err(SearchError::Timeout(self.config.timeout)),
        };

        let result = ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.stdout.is_empty() {
            debug!(stdout = %result.stdout, "Domain search stdout");
        }
        if !result.stderr.is_empty() {
            debug!(stderr = %result.stderr, "Domain search stderr");
        }

        if !output.status.success() {
            return Err(SearchError::ToolFailed {
                code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }

        Ok(result)
    }
}

/// Directory path with a trailing separator.
fn dir_prefix(dir: &Path) -> OsString {
    let mut prefix = dir.as_os_str().to_owned();
    if !dir.as_os_str().to_string_lossy().ends_with(std::path::MAIN_SEPARATOR) {
        prefix.push(std::path::MAIN_SEPARATOR_STR);
    }
    prefix
}

fn display_command(program: &OsString, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args)
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
