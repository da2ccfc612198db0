//! Bootstrap sequence.
//!
//! Linear, no retries:
//! 1. resolve paths
//! 2. ensure the task-runner tool is installed
//! 3. acquire the library bundle and run its initialization task
//! 4. acquire the target bundle and run the requested task
//! 5. restore the working directory to the install directory
//!
//! Any failure stops the run and is wrapped in [`Error::Step`] naming the
//! step it came from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use taskrunner_core::tasks::{ExecutorConfig, TaskInvoker, TaskOutput};
use taskrunner_core::{
    ArchAlias, ArchiveKind, BootstrapStep, Error, InstallDir, PlatformProfile, Result, ScratchRoot,
    default_install_dir, expected_root, extract, mark_executable, resolve_platform,
};
use taskrunner_tools_github::{ReleaseClient, ReleaseSource};
use tracing::{debug, info, warn};

use crate::bundle::{BundleAcquirer, BundleLocation};
use crate::cli::RunnerConfig;

/// Everything the bootstrap steps share, built once per run.
#[derive(Debug)]
pub struct RunnerContext {
    /// Host platform.
    pub platform: PlatformProfile,
    /// Install directory for tool binaries.
    pub install_dir: InstallDir,
    /// Scratch root for downloads and extractions.
    pub scratch: ScratchRoot,
    /// Release API client.
    pub client: ReleaseClient,
    /// Task and clone timeout.
    pub task_timeout: Option<Duration>,
}

impl RunnerContext {
    /// Resolve the platform, the install directory and the scratch root.
    ///
    /// The install directory is created if absent.
    pub fn new(config: &RunnerConfig) -> Result<Self> {
        // Go-style arch names match how tool releases are published
        let platform = resolve_platform(ArchAlias::Go)?;
        Self::with_platform(config, platform)
    }

    /// Like [`RunnerContext::new`] with an explicit platform.
    pub fn with_platform(config: &RunnerConfig, platform: PlatformProfile) -> Result<Self> {
        let root = config
            .bin_dir
            .clone()
            .unwrap_or_else(|| default_install_dir(platform.is_windows()));
        let install_dir = InstallDir::new(root, platform.exe_suffix.clone());
        install_dir.ensure()?;

        let scratch = match (&config.scratch_dir, config.keep_scratch) {
            (Some(dir), _) => ScratchRoot::at(dir)?,
            (None, true) => ScratchRoot::kept()?,
            (None, false) => ScratchRoot::temporary()?,
        };

        let client = ReleaseClient::new(&config.github_api, config.token.clone(), config.http_timeout)?;

        info!(
            platform = %platform,
            install_dir = ?install_dir.root(),
            scratch = ?scratch.path(),
            "Resolved paths"
        );

        Ok(Self {
            platform,
            install_dir,
            scratch,
            client,
            task_timeout: config.task_timeout,
        })
    }

    /// Task invoker for the installed tool.
    #[must_use]
    pub fn invoker(&self, binary_name: &str) -> TaskInvoker {
        let config = ExecutorConfig::new(self.install_dir.binary_path(binary_name))
            .with_bin_dir(self.install_dir.root())
            .with_timeout(self.task_timeout);
        TaskInvoker::new(config)
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct BootstrapOutcome {
    /// Whether the tool was downloaded during this run.
    pub tool_downloaded: bool,
    /// Directory of the library bundle.
    pub library_dir: PathBuf,
    /// Directory of the target bundle.
    pub target_dir: PathBuf,
    /// Output of the requested task.
    pub output: TaskOutput,
}

/// Restores the working directory when dropped.
struct WorkingDirGuard {
    restore_to: PathBuf,
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        match std::env::set_current_dir(&self.restore_to) {
            Ok(()) => debug!(step = %BootstrapStep::Cleanup, dir = ?self.restore_to, "Restored working directory"),
            Err(e) => warn!(
                step = %BootstrapStep::Cleanup,
                dir = ?self.restore_to,
                error = %e,
                "Failed to restore working directory"
            ),
        }
    }
}

/// The bootstrap sequence for one configuration.
#[derive(Debug)]
pub struct Bootstrap<'a> {
    config: &'a RunnerConfig,
    context: &'a RunnerContext,
    acquirer: BundleAcquirer,
}

impl<'a> Bootstrap<'a> {
    /// Sequence for `config` using the default providers.
    #[must_use]
    pub fn new(config: &'a RunnerConfig, context: &'a RunnerContext) -> Self {
        let acquirer = BundleAcquirer::new(context.client.clone(), context.platform.clone(), context.task_timeout);
        Self::with_acquirer(config, context, acquirer)
    }

    /// Sequence with a custom acquirer.
    #[must_use]
    pub fn with_acquirer(config: &'a RunnerConfig, context: &'a RunnerContext, acquirer: BundleAcquirer) -> Self {
        Self {
            config,
            context,
            acquirer,
        }
    }

    /// Run every step after path resolution.
    pub async fn run(&self) -> Result<BootstrapOutcome> {
        let _restore = WorkingDirGuard {
            restore_to: self.context.install_dir.root().to_path_buf(),
        };

        let tool_downloaded = self
            .ensure_runner_tool()
            .await
            .map_err(|e| e.in_step(BootstrapStep::EnsureRunnerTool))?;

        let library_dir = self
            .acquire(&self.config.library)
            .await
            .map_err(|e| e.in_step(BootstrapStep::AcquireLibraryBundle))?;

        let invoker = self.context.invoker(&self.config.binary_name);

        info!(step = %BootstrapStep::InitializeDependencies, task = %self.config.library_task, "Initializing dependencies");
        invoker
            .run(&library_dir, &self.config.library_task, &[])
            .await
            .map_err(|e| e.in_step(BootstrapStep::InitializeDependencies))?;

        let target_dir = self
            .acquire(&self.config.target)
            .await
            .map_err(|e| e.in_step(BootstrapStep::AcquireTargetBundle))?;

        info!(step = %BootstrapStep::RunRequestedTask, task = %self.config.task_name, args = ?self.config.task_args, "Running requested task");
        let output = invoker
            .run(&target_dir, &self.config.task_name, &self.config.task_args)
            .await
            .map_err(|e| e.in_step(BootstrapStep::RunRequestedTask))?;

        Ok(BootstrapOutcome {
            tool_downloaded,
            library_dir,
            target_dir,
            output,
        })
    }

    async fn acquire(&self, bundle: &BundleLocation) -> Result<PathBuf> {
        self.acquirer.acquire(bundle, &self.context.scratch).await
    }

    /// Download and install the tool unless it is already installed.
    async fn ensure_runner_tool(&self) -> Result<bool> {
        let name = &self.config.binary_name;
        let install_dir = &self.context.install_dir;
        if install_dir.is_installed(name)? {
            info!(binary = ?install_dir.binary_path(name), "Task runner already installed");
            return Ok(false);
        }

        let mut source = ReleaseSource::for_tool(&self.config.binary_repo, name, &self.context.platform);
        if let Some(template) = &self.config.binary_template {
            source = source.with_template(template.clone());
        }

        let scratch = self.context.scratch.path();
        let downloaded = self.context.client.download_latest(&source, scratch).await?;

        let executable = if ArchiveKind::from_name(&downloaded.asset.name).is_some() {
            let asset_dir = expected_root(scratch, &downloaded.asset.name)?;
            extract(&downloaded.path, &asset_dir)?;
            locate_executable(scratch, &asset_dir, &self.context.platform.executable_name(name), &downloaded.asset.name)?
        } else {
            debug!(asset = %downloaded.asset.name, "Asset is a raw binary");
            mark_executable(&downloaded.path)?;
            downloaded.path
        };

        install_dir.install_binary(&executable, name)?;
        Ok(true)
    }
}

fn locate_executable(scratch: &Path, asset_dir: &Path, exe_name: &str, asset_name: &str) -> Result<PathBuf> {
    let executable = asset_dir.join(exe_name);
    if executable.is_file() {
        Ok(executable)
    } else {
        Err(Error::ExtractionIncomplete {
            scratch_dir: scratch.to_path_buf(),
            asset_dir: executable,
            asset_name: asset_name.to_string(),
        })
    }
}

/// Run the whole bootstrap for `config`.
pub async fn run(config: &RunnerConfig) -> Result<BootstrapOutcome> {
    let context = RunnerContext::new(config).map_err(|e| e.in_step(BootstrapStep::ResolvePaths))?;
    Bootstrap::new(config, &context).run().await
}
