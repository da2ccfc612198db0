//! Task invoker for running bundle tasks through the task-runner tool.
//!
//! - Runs `<runner> --verbose <task> [args...]` inside the bundle directory
//! - Exports environment overrides to the child
//! - Captures stdout and stderr into one arrival-ordered buffer while
//!   echoing each line to the operator
//! - Optional timeout; the child is killed when it expires

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Environment variable bundles use to find sibling binaries.
pub const BIN_DIR_ENV: &str = "TASKFILE_BIN_DIR";

/// Number of output lines to include when summarizing failures
pub const TASK_FAILURE_SNIPPET_LINES: usize = 20;

/// Task execution result
#[derive(Debug, Clone)]
pub struct TaskOutput {
    /// Task that was run.
    pub task_name: String,
    /// Exit code, `None` when the child was ended by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, one entry per line in arrival order.
    pub output: String,
    /// Whether the child exited with status zero.
    pub success: bool,
}

/// Task invoker configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Path to the task-runner binary
    pub runner_binary: PathBuf,
    /// Variables exported to the child on top of the inherited environment
    pub environment: BTreeMap<String, String>,
    /// Kill the child after this long
    pub timeout: Option<Duration>,
    /// Echo child output to stdout as it arrives
    pub echo: bool,
}

impl ExecutorConfig {
    /// Configuration for `runner_binary` with echo on and no timeout.
    #[must_use]
    pub fn new(runner_binary: impl Into<PathBuf>) -> Self {
        Self {
            runner_binary: runner_binary.into(),
            environment: BTreeMap::new(),
            timeout: None,
            echo: true,
        }
    }

    /// Export the install directory under [`BIN_DIR_ENV`].
    #[must_use]
    pub fn with_bin_dir(mut self, bin_dir: &Path) -> Self {
        self.environment
            .insert(BIN_DIR_ENV.to_string(), bin_dir.to_string_lossy().into_owned());
        self
    }

    /// Set the child timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs named tasks from a bundle directory.
#[derive(Debug, Clone)]
pub struct TaskInvoker {
    config: ExecutorConfig,
}

impl TaskInvoker {
    /// Create a new invoker
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Full command line for a task: `[runner, "--verbose", task, args...]`.
    #[must_use]
    pub fn command_line(&self, task_name: &str, args: &[String]) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(args.len() + 3);
        argv.push(self.config.runner_binary.clone().into_os_string());
        argv.push(OsString::from("--verbose"));
        argv.push(OsString::from(task_name));
        argv.extend(args.iter().map(OsString::from));
        argv
    }

    /// Run `task_name` with `args` inside `bundle_dir`.
    ///
    /// Output is echoed whether or not the task succeeds. A non-zero exit is
    /// returned as [`Error::TaskExecution`] carrying the captured output.
    pub async fn run(&self, bundle_dir: &Path, task_name: &str, args: &[String]) -> Result<TaskOutput> {
        if task_name.trim().is_empty() {
            return Err(Error::invalid_config("task name", "must not be empty"));
        }
        if !bundle_dir.is_dir() {
            return Err(Error::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "bundle directory does not exist"),
                Some(bundle_dir.to_path_buf()),
                "enter bundle directory",
            ));
        }

        let argv = self.command_line(task_name, args);
        tracing::info!(task = %task_name, dir = ?bundle_dir, command = ?argv, "Executing task");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(bundle_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.config.environment {
            cmd.env(k, v);
        }

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            Error::io(e, Some(self.config.runner_binary.clone()), format!("spawn task {task_name}"))
        })?;

        // Both readers feed one channel so the buffer keeps arrival order
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let echo = self.config.echo;
        let run = async {
            let (lines, status) = tokio::join!(collect_lines(rx, echo), child.wait());
            (lines, status)
        };

        let (lines, status) = match self.config.timeout {
            None => run.await,
            Some(limit) => {
                if let Ok(done) = tokio::time::timeout(limit, run).await {
                    done
                } else {
                    tracing::error!(task = %task_name, seconds = limit.as_secs(), "Task timed out, killing");
                    let _ = child.kill().await;
                    return Err(Error::timeout(format!("task '{task_name}'"), limit.as_secs()));
                }
            }
        };

        let status = status.map_err(|e| {
            Error::io(e, Some(bundle_dir.to_path_buf()), format!("wait for task {task_name}"))
        })?;

        let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = TaskOutput {
            task_name: task_name.to_string(),
            exit_code: status.code(),
            output: lines.join("\n"),
            success: status.success(),
        };

        if result.success {
            tracing::info!(task = %task_name, duration_ms, "Task finished");
            Ok(result)
        } else {
            tracing::warn!(task = %task_name, exit = ?result.exit_code, duration_ms, "Task failed");
            tracing::error!(
                task = %task_name,
                "{}",
                summarize_task_failure(&result, TASK_FAILURE_SNIPPET_LINES)
            );
            Err(Error::TaskExecution {
                task_name: result.task_name,
                exit_code: result.exit_code,
                output: result.output,
            })
        }
    }
}

/// Forward each line of `stream` until EOF.
///
/// Lines are split on raw `\n` and decoded lossily, so output in a legacy
/// code page is kept instead of ending the read. The pipe is drained even
/// after the collector goes away so the child never blocks or sees EPIPE.
async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut forwarding = true;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if forwarding && tx.send(decode_line(&buf)).is_err() {
                    forwarding = false;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read task output");
                break;
            }
        }
    }
}

/// Decode one raw line, dropping the trailing `\n` or `\r\n`.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

async fn collect_lines(mut rx: mpsc::UnboundedReceiver<String>, echo: bool) -> Vec<String> {
    let mut out = tokio::io::stdout();
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        if echo {
            let _ = out.write_all(line.as_bytes()).await;
            let _ = out.write_all(b"\n").await;
        }
        lines.push(line);
    }
    let _ = out.flush().await;
    lines
}

/// Split a space-delimited argument string, keeping order.
#[must_use]
pub fn split_task_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

/// Build a compact summary for a failed task: the exit code and the tail
/// of its output.
pub fn summarize_task_failure(result: &TaskOutput, max_output_lines: usize) -> String {
    let exit_code = result
        .exit_code
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());

    let header = format!("Task '{}' failed with exit code {}.", result.task_name, exit_code);
    let normalized = result.output.trim_end();
    if normalized.is_empty() {
        return format!("{header}\n\nThe task produced no output.");
    }

    let lines: Vec<&str> = normalized.lines().collect();
    let total = lines.len();
    let start = total.saturating_sub(max_output_lines);
    let snippet = lines[start..].join("\n");
    let label = if total > max_output_lines {
        format!("output (last {max_output_lines} of {total} lines):")
    } else {
        "output:".to_string()
    };

    format!("{header}\n\n{label}\n{snippet}")
}
