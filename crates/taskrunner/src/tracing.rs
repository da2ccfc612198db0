//! Tracing configuration for the task-runner binary
//!
//! Logs go to stderr so task output echoed on stdout stays separate.
//! `RUST_LOG` wins over the configured level when it is set.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Multi-line, indented.
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON for log shippers.
    Json,
    /// One line per event with file and line.
    Dev,
}

/// Minimum level from `RUNNER_LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Step detail.
    Debug,
    /// Step boundaries and results.
    Info,
    /// Recoverable oddities.
    Warn,
    /// Failures only.
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Subscriber settings for one run.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Line format.
    pub format: TracingFormat,
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    /// Include file and line in `Dev` output.
    pub enable_file_location: bool,
    /// Explicit `EnvFilter` directives.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::INFO,
            enable_file_location: true,
            filter: None,
        }
    }
}

static RUN_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Id logged once at start-up so one run's lines can be grepped together.
pub fn correlation_id() -> Uuid {
    *RUN_ID.get_or_init(Uuid::new_v4)
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    ["taskrunner", "taskrunner_core", "taskrunner_tools_github"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let correlation_id = correlation_id();

    let env_filter = if let Some(filter) = config.filter {
        EnvFilter::try_new(filter)
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_directives(config.level)))
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true);

            registry.with(layer).try_init()
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .with_thread_ids(false);

            registry.with(layer).try_init()
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);

            registry.with(layer).try_init()
        }
        TracingFormat::Dev => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_file(config.enable_file_location)
                .with_line_number(config.enable_file_location)
                .with_target(true)
                .with_level(true);

            registry.with(layer).try_init()
        }
    };
    installed.map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;

    tracing::info!(
        correlation_id = %correlation_id,
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized for task-runner"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_cli_value() {
        use clap::ValueEnum;
        assert_eq!(TracingFormat::from_str("json", true).unwrap(), TracingFormat::Json);
        assert_eq!(TracingFormat::from_str("Dev", true).unwrap(), TracingFormat::Dev);
        assert!(TracingFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_default_directives_cover_all_crates() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.contains("taskrunner=debug"));
        assert!(directives.contains("taskrunner_core=debug"));
        assert!(directives.contains("taskrunner_tools_github=debug"));
    }

    #[test]
    fn test_correlation_id_is_stable() {
        assert_eq!(correlation_id(), correlation_id());
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.level, Level::INFO);
    }
}
