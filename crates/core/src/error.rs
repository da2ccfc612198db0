//! Error taxonomy shared by every task-runner crate.
//!
//! Each variant maps onto one failure class of the bootstrap: platform lookup,
//! release metadata, asset matching, extraction, configuration, and task
//! execution. Variants carry the URL, path or repository that failed so a
//! single log line is enough to diagnose a run.

use miette::Diagnostic;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for task-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One step of the bootstrap sequence, used to annotate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    /// Compute scratch root and install directory.
    ResolvePaths,
    /// Download the task-runner tool when it is missing.
    EnsureRunnerTool,
    /// Acquire the shared dependency-installer bundle.
    AcquireLibraryBundle,
    /// Run the library bundle's initialization task.
    InitializeDependencies,
    /// Acquire the caller-specified bundle.
    AcquireTargetBundle,
    /// Run the caller-specified task.
    RunRequestedTask,
    /// Restore the working directory.
    Cleanup,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolvePaths => "resolve-paths",
            Self::EnsureRunnerTool => "ensure-runner-tool",
            Self::AcquireLibraryBundle => "acquire-library-bundle",
            Self::InitializeDependencies => "initialize-dependencies",
            Self::AcquireTargetBundle => "acquire-target-bundle",
            Self::RunRequestedTask => "run-requested-task",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while bootstrapping and running a task.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Host OS or architecture has no entry in the platform table.
    #[error("Unsupported platform: os '{os}', arch '{arch}'")]
    #[diagnostic(
        code(taskrunner::platform::unsupported),
        help("Supported platforms are linux, darwin and windows on x86_64 or arm64")
    )]
    UnsupportedPlatform {
        /// Lower-cased OS identifier.
        os: String,
        /// Lower-cased architecture identifier.
        arch: String,
    },

    /// Latest-release metadata could not be fetched or parsed.
    #[error("Failed to fetch release metadata for '{repo}' from {url}: {message}")]
    #[diagnostic(code(taskrunner::release::metadata))]
    MetadataFetch {
        /// Repository identifier (owner/name).
        repo: String,
        /// Endpoint that was queried.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// No published asset matched the search pattern.
    #[error("No asset in the latest release of '{repo}' matches pattern '{pattern}'")]
    #[diagnostic(
        code(taskrunner::release::asset_not_found),
        help("Check the asset names published by the latest release")
    )]
    AssetNotFound {
        /// Repository identifier (owner/name).
        repo: String,
        /// The compiled search expression.
        pattern: String,
        /// Asset names that were published.
        available: Vec<String>,
    },

    /// Downloading an asset failed.
    #[error("Failed to download {url}: {message}")]
    #[diagnostic(code(taskrunner::release::download))]
    Download {
        /// Asset URL.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// The archive suffix is not one the extractor handles.
    #[error("Unsupported archive format: {}", .path.display())]
    #[diagnostic(
        code(taskrunner::extract::unsupported),
        help("Archives must end with .zip, .tar.gz or .tgz")
    )]
    UnsupportedArchive {
        /// Archive path.
        path: PathBuf,
    },

    /// An archive member would be written outside the destination directory.
    #[error("Archive {} contains an unsafe member '{entry}'", .archive.display())]
    #[diagnostic(code(taskrunner::extract::unsafe_entry))]
    UnsafeArchiveEntry {
        /// Archive path.
        archive: PathBuf,
        /// The offending member name.
        entry: String,
    },

    /// Extraction finished but the expected directory or file is missing.
    #[error(
        "Extraction incomplete: scratch dir '{}', expected asset dir '{}', asset '{asset_name}'",
        .scratch_dir.display(),
        .asset_dir.display()
    )]
    #[diagnostic(code(taskrunner::extract::incomplete))]
    ExtractionIncomplete {
        /// Directory the archive was extracted into.
        scratch_dir: PathBuf,
        /// Directory (or file) that should exist afterwards.
        asset_dir: PathBuf,
        /// Name of the downloaded asset.
        asset_name: String,
    },

    /// A required configuration value is absent.
    #[error("Missing required configuration: {variable} is not set")]
    #[diagnostic(
        code(taskrunner::config::missing),
        help("Set the variable in the environment or pass the matching flag")
    )]
    MissingConfig {
        /// Environment variable name.
        variable: String,
    },

    /// A configuration value is present but unusable.
    #[error("Invalid value for {variable}: {message}")]
    #[diagnostic(code(taskrunner::config::invalid))]
    InvalidConfig {
        /// Environment variable name.
        variable: String,
        /// What is wrong with it.
        message: String,
    },

    /// A bundle location string cannot be interpreted for its kind.
    #[error("Invalid bundle location '{location}': {message}")]
    #[diagnostic(code(taskrunner::bundle::invalid_location))]
    InvalidLocation {
        /// The location string.
        location: String,
        /// What is wrong with it.
        message: String,
    },

    /// Cloning a version-control bundle failed.
    #[error("Failed to clone '{location}': {message}")]
    #[diagnostic(code(taskrunner::bundle::clone))]
    Clone {
        /// Remote location.
        location: String,
        /// What went wrong.
        message: String,
    },

    /// The task-runner exited with a non-zero status.
    #[error("Task '{task_name}' failed with exit code {}", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    #[diagnostic(code(taskrunner::task::failed))]
    TaskExecution {
        /// Task that was run.
        task_name: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Combined stdout and stderr.
        output: String,
    },

    /// An operation exceeded its configured time limit.
    #[error("{operation} timed out after {seconds} seconds")]
    #[diagnostic(code(taskrunner::timeout))]
    Timeout {
        /// What was running.
        operation: String,
        /// Configured limit.
        seconds: u64,
    },

    /// Filesystem or process I/O failure.
    #[error("I/O error during {operation}{}: {source}", .path.as_ref().map(|p| format!(" on '{}'", p.display())).unwrap_or_default())]
    #[diagnostic(code(taskrunner::io))]
    Io {
        /// Underlying error.
        #[source]
        source: std::io::Error,
        /// Path involved, if any.
        path: Option<PathBuf>,
        /// Operation being performed.
        operation: String,
    },

    /// A bootstrap step failed.
    #[error("Bootstrap step '{step}' failed")]
    #[diagnostic(code(taskrunner::bootstrap))]
    Step {
        /// Step that failed.
        step: BootstrapStep,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an unsupported platform error.
    #[must_use]
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Create a metadata fetch error.
    #[must_use]
    pub fn metadata_fetch(
        repo: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MetadataFetch {
            repo: repo.into(),
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a download error.
    #[must_use]
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a missing configuration error.
    #[must_use]
    pub fn missing_config(variable: impl Into<String>) -> Self {
        Self::MissingConfig {
            variable: variable.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Create an invalid location error.
    #[must_use]
    pub fn invalid_location(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLocation {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with the operation and optional path.
    #[must_use]
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path,
            operation: operation.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Annotate this error with the bootstrap step it came from.
    #[must_use]
    pub fn in_step(self, step: BootstrapStep) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping step annotations.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach an operation and path to I/O results.
pub trait IoResultExt<T> {
    /// Map an I/O error into [`Error::Io`].
    fn with_path(self, path: impl Into<PathBuf>, operation: &str) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>, operation: &str) -> Result<T> {
        self.map_err(|e| Error::io(e, Some(path.into()), operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_annotation_keeps_root() {
        let err = Error::missing_config("RUNNER_TASK_NAME").in_step(BootstrapStep::ResolvePaths);
        assert!(err.to_string().contains("resolve-paths"));
        assert!(matches!(err.root(), Error::MissingConfig { variable } if variable == "RUNNER_TASK_NAME"));
    }

    #[test]
    fn test_asset_not_found_names_pattern() {
        let err = Error::AssetNotFound {
            repo: "go-task/task".into(),
            pattern: r"task_linux_amd64\.tar\.gz".into(),
            available: vec!["task_darwin_arm64.tar.gz".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("go-task/task"));
        assert!(msg.contains(r"task_linux_amd64\.tar\.gz"));
    }

    #[test]
    fn test_task_execution_unknown_exit_code() {
        let err = Error::TaskExecution {
            task_name: "build".into(),
            exit_code: None,
            output: String::new(),
        };
        assert_eq!(err.to_string(), "Task 'build' failed with exit code unknown");
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            Some(PathBuf::from("/opt/task-runner/bin")),
            "create install directory",
        );
        let msg = err.to_string();
        assert!(msg.contains("create install directory"));
        assert!(msg.contains("/opt/task-runner/bin"));
    }

    #[test]
    fn test_extraction_incomplete_names_all_three() {
        let err = Error::ExtractionIncomplete {
            scratch_dir: PathBuf::from("/tmp/s/runner"),
            asset_dir: PathBuf::from("/tmp/s/runner/bundle-v1.2.0"),
            asset_name: "bundle-v1.2.0.tar.gz".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/s/runner'"));
        assert!(msg.contains("bundle-v1.2.0'"));
        assert!(msg.contains("bundle-v1.2.0.tar.gz"));
    }
}
