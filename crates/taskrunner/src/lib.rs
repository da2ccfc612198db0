//! task-runner: bootstrap a task-runner tool and run a task from a bundle.
//!
//! The binary in `main.rs` is a thin wrapper: parse [`cli::Cli`], set up
//! [`tracing`], then hand the validated [`cli::RunnerConfig`] to
//! [`orchestrator::run`].

pub mod bundle;
pub mod cli;
pub mod orchestrator;
pub mod tracing;

pub use bundle::{
    BundleAcquirer, BundleKind, BundleLocation, BundleProvider, FilesystemProvider, GitProvider,
    ReleaseProvider,
};
pub use cli::{Cli, EXIT_FAILURE, EXIT_OK, RunnerConfig};
pub use orchestrator::{Bootstrap, BootstrapOutcome, RunnerContext, run};
pub use taskrunner_core::{Error, Result};
