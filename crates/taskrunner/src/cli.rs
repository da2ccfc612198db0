//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through its `RUNNER_*` variable.
//! Required values are optional at parse time and checked in
//! [`Cli::into_config`], so a missing value is a [`Error::MissingConfig`]
//! with exit code 1 rather than a usage error.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use taskrunner_core::tasks::split_task_args;
use taskrunner_core::{Error, Result};
use taskrunner_tools_github::{AssetTemplate, DEFAULT_API_BASE};

use crate::bundle::{BundleKind, BundleLocation};
use crate::tracing::{LogLevel, TracingFormat};

/// Exit code for success
pub const EXIT_OK: i32 = 0;
/// Exit code for any failure
pub const EXIT_FAILURE: i32 = 1;

/// Scratch namespace of the dependency-installer bundle.
pub const LIBRARY_BUNDLE_NAME: &str = "library";
/// Scratch namespace of the caller's bundle.
pub const TARGET_BUNDLE_NAME: &str = "runner";

/// Bootstrap a task-runner tool and run a task from a bundle.
#[derive(Parser, Debug)]
#[command(name = "task-runner")]
#[command(about = "Install the task runner, fetch task bundles and run a task")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// Task-runner tool binary name.
    #[arg(long, env = "RUNNER_BINARY", default_value = "task")]
    pub binary: String,

    /// Release repository of the task-runner tool.
    #[arg(long, env = "RUNNER_BINARY_REPO", default_value = "go-task/task")]
    pub binary_repo: String,

    /// Asset template for the tool release, e.g. `{base_name}_{os_tag}_{arch_tag}{compress_ext}`.
    #[arg(long, env = "RUNNER_BINARY_TEMPLATE")]
    pub binary_template: Option<String>,

    /// Location of the dependency-installer bundle.
    #[arg(long, env = "RUNNER_LIBRARY_LOCATION", default_value = "NiceGuyIT/taskfiles")]
    pub library_location: String,

    /// Kind of the dependency-installer bundle.
    #[arg(long, env = "RUNNER_LIBRARY_TYPE", default_value = "repo")]
    pub library_type: String,

    /// Initialization task of the dependency-installer bundle.
    #[arg(long, env = "RUNNER_LIBRARY_TASK", default_value = "init:all")]
    pub library_task: String,

    /// Location of the bundle holding the task to run.
    #[arg(long, env = "RUNNER_TASK_LOCATION")]
    pub task_location: Option<String>,

    /// Kind of the task bundle: git, repo or filesystem.
    #[arg(long, env = "RUNNER_TASK_TYPE")]
    pub task_type: Option<String>,

    /// Task to run.
    #[arg(long, env = "RUNNER_TASK_NAME")]
    pub task_name: Option<String>,

    /// Space-delimited task arguments.
    #[arg(long, env = "RUNNER_TASK_ARGS", allow_hyphen_values = true)]
    pub task_args: Option<String>,

    /// Install directory for tool binaries.
    #[arg(long, env = "RUNNER_BIN_DIR")]
    pub bin_dir: Option<PathBuf>,

    /// Scratch directory to use instead of a fresh temporary one. Never removed.
    #[arg(long, env = "RUNNER_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Keep the temporary scratch directory after exit.
    #[arg(long, env = "RUNNER_KEEP_SCRATCH")]
    pub keep_scratch: bool,

    /// Release API base URL.
    #[arg(long, env = "RUNNER_GITHUB_API", default_value = DEFAULT_API_BASE)]
    pub github_api: String,

    /// Release API token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Fallback release API token.
    #[arg(long, env = "GH_TOKEN", hide_env_values = true, hide = true)]
    pub gh_token: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "RUNNER_HTTP_TIMEOUT", default_value_t = 300)]
    pub http_timeout: u64,

    /// Timeout in seconds for each task and git clone.
    #[arg(long, env = "RUNNER_TASK_TIMEOUT")]
    pub task_timeout: Option<u64>,

    /// Logging verbosity level.
    #[arg(long, env = "RUNNER_LOG_LEVEL", default_value = "info", value_enum)]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(long, env = "RUNNER_LOG_FORMAT", default_value = "compact", value_enum)]
    pub log_format: TracingFormat,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Task-runner tool binary name.
    pub binary_name: String,
    /// Release repository of the tool.
    pub binary_repo: String,
    /// Custom asset template for the tool release.
    pub binary_template: Option<AssetTemplate>,
    /// Dependency-installer bundle.
    pub library: BundleLocation,
    /// Initialization task run in the library bundle.
    pub library_task: String,
    /// Bundle holding the requested task.
    pub target: BundleLocation,
    /// Requested task.
    pub task_name: String,
    /// Requested task arguments, in order.
    pub task_args: Vec<String>,
    /// Install directory override.
    pub bin_dir: Option<PathBuf>,
    /// Scratch directory override.
    pub scratch_dir: Option<PathBuf>,
    /// Keep the temporary scratch directory.
    pub keep_scratch: bool,
    /// Release API base URL.
    pub github_api: String,
    /// Release API token.
    pub token: Option<String>,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Task and clone timeout.
    pub task_timeout: Option<Duration>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, variable: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| Error::missing_config(variable))
}

fn bundle_kind(value: &str, variable: &str) -> Result<BundleKind> {
    value.parse::<BundleKind>().map_err(|e| match e {
        Error::InvalidConfig { message, .. } => Error::invalid_config(variable, message),
        other => other,
    })
}

impl Cli {
    /// Validate into a [`RunnerConfig`].
    pub fn into_config(self) -> Result<RunnerConfig> {
        let task_location = required(self.task_location, "RUNNER_TASK_LOCATION")?;
        let task_type = required(self.task_type, "RUNNER_TASK_TYPE")?;
        let task_name = required(self.task_name, "RUNNER_TASK_NAME")?;

        let target = BundleLocation::new(
            TARGET_BUNDLE_NAME,
            task_location,
            bundle_kind(&task_type, "RUNNER_TASK_TYPE")?,
        );
        let library = BundleLocation::new(
            LIBRARY_BUNDLE_NAME,
            self.library_location,
            bundle_kind(&self.library_type, "RUNNER_LIBRARY_TYPE")?,
        );

        let binary_template = non_empty(self.binary_template)
            .map(|t| {
                AssetTemplate::parse(&t).map_err(|e| match e {
                    Error::InvalidConfig { message, .. } => {
                        Error::invalid_config("RUNNER_BINARY_TEMPLATE", message)
                    }
                    other => other,
                })
            })
            .transpose()?;

        if self.binary.trim().is_empty() {
            return Err(Error::invalid_config("RUNNER_BINARY", "must not be empty"));
        }
        if self.http_timeout == 0 {
            return Err(Error::invalid_config("RUNNER_HTTP_TIMEOUT", "must be at least 1 second"));
        }
        if self.task_timeout == Some(0) {
            return Err(Error::invalid_config("RUNNER_TASK_TIMEOUT", "must be at least 1 second"));
        }

        Ok(RunnerConfig {
            binary_name: self.binary,
            binary_repo: self.binary_repo,
            binary_template,
            library,
            library_task: self.library_task,
            target,
            task_name,
            task_args: self.task_args.as_deref().map(split_task_args).unwrap_or_default(),
            bin_dir: self.bin_dir,
            scratch_dir: self.scratch_dir,
            keep_scratch: self.keep_scratch,
            github_api: self.github_api,
            token: non_empty(self.github_token).or_else(|| non_empty(self.gh_token)),
            http_timeout: Duration::from_secs(self.http_timeout),
            task_timeout: self.task_timeout.map(Duration::from_secs),
        })
    }
}

/// Parse arguments and environment.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse_args(args: &[&str]) -> Cli {
        let mut argv = vec!["task-runner"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_full_config() {
        let config = parse_args(&[
            "--task-location",
            "Org/bundle",
            "--task-type",
            "packaged-release",
            "--task-name",
            "build",
            "--task-args",
            "--force  target",
            "--task-timeout",
            "60",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.target.name, "runner");
        assert_eq!(config.target.location, "Org/bundle");
        assert_eq!(config.target.kind, BundleKind::PackagedRelease);
        assert_eq!(config.library.name, "library");
        assert_eq!(config.library.kind, BundleKind::PackagedRelease);
        assert_eq!(config.task_args, vec!["--force", "target"]);
        assert_eq!(config.task_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.http_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_missing_task_name() {
        let err = parse_args(&["--task-location", "Org/bundle", "--task-type", "repo"])
            .into_config()
            .unwrap_err();
        match err {
            Error::MissingConfig { variable } => assert_eq!(variable, "RUNNER_TASK_NAME"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = parse_args(&["--task-location", " ", "--task-type", "repo", "--task-name", "x"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfig { ref variable } if variable == "RUNNER_TASK_LOCATION"));
    }

    #[test]
    fn test_unknown_bundle_type_names_variable() {
        let err = parse_args(&["--task-location", "x", "--task-type", "svn", "--task-name", "x"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref variable, .. } if variable == "RUNNER_TASK_TYPE"));
    }

    #[test]
    fn test_custom_binary_template() {
        let config = parse_args(&[
            "--task-location",
            "/srv/tasks",
            "--task-type",
            "local",
            "--task-name",
            "x",
            "--binary-template",
            "{base_name}-{os_tag}{compress_ext}",
        ])
        .into_config()
        .unwrap();
        assert_eq!(
            config.binary_template.map(|t| t.to_string()).as_deref(),
            Some("{base_name}-{os_tag}{compress_ext}")
        );

        let err = parse_args(&[
            "--task-location",
            "/srv/tasks",
            "--task-type",
            "local",
            "--task-name",
            "x",
            "--binary-template",
            "{name}",
        ])
        .into_config()
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref variable, .. } if variable == "RUNNER_BINARY_TEMPLATE"));
    }

    #[test]
    fn test_token_fallback() {
        let config = parse_args(&[
            "--task-location",
            "/srv/tasks",
            "--task-type",
            "filesystem",
            "--task-name",
            "x",
            "--gh-token",
            "fallback",
        ])
        .into_config()
        .unwrap();
        if std::env::var_os("GITHUB_TOKEN").is_none() {
            assert_eq!(config.token.as_deref(), Some("fallback"));
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = parse_args(&[
            "--task-location",
            "/srv/tasks",
            "--task-type",
            "filesystem",
            "--task-name",
            "x",
            "--http-timeout",
            "0",
        ])
        .into_config()
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
