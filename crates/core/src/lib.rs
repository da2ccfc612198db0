//! Core types and utilities for task-runner
//!
//! Platform detection, the binary install directory, the per-run scratch
//! root, archive extraction and the task invoker. Network access lives in
//! `taskrunner-tools-github`; orchestration lives in the `taskrunner` crate.

pub mod error;
pub mod extract;
pub mod install;
pub mod platform;
pub mod scratch;
pub mod tasks;

pub use error::{BootstrapStep, Error, IoResultExt, Result};
pub use extract::{ArchiveKind, expected_root, extract, verify_extracted_root};
pub use install::{InstallDir, default_install_dir, mark_executable};
pub use platform::{ArchAlias, PlatformProfile, resolve_platform};
pub use scratch::ScratchRoot;
pub use tasks::{ExecutorConfig, TaskInvoker, TaskOutput};
