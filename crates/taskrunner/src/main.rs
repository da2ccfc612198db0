//! task-runner binary
//!
//! Exit code 0 on success, 1 on any failure.

// Fatal errors before tracing is up can only go to stderr
#![allow(clippy::print_stderr)]

use taskrunner::cli::{self, EXIT_FAILURE, EXIT_OK};
use taskrunner::tracing::{TracingConfig, init_tracing};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUNNER_LOG_LEVEL=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("Failed to initialize tracing: {e}");
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    let exit_code = rt.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: cli::Cli) -> i32 {
    let result = match cli.into_config() {
        Ok(config) => taskrunner::run(&config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => {
            tracing::info!(
                task = %outcome.output.task_name,
                tool_downloaded = outcome.tool_downloaded,
                "Task completed"
            );
            EXIT_OK
        }
        Err(err) => {
            tracing::error!(error = %err, root_cause = %err.root(), "Bootstrap failed");
            eprintln!("{:?}", miette::Report::new(err));
            EXIT_FAILURE
        }
    }
}
