//! Bundle acquisition.
//!
//! A bundle is a directory of task definitions. It can come from a packaged
//! GitHub release, a git remote, or the local filesystem; each source kind is
//! handled by a [`BundleProvider`]. Bundles that need a working directory get
//! `<scratch>/<bundle name>` so the library and target bundles never collide.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use taskrunner_core::{Error, PlatformProfile, Result, ScratchRoot, extract, verify_extracted_root};
use taskrunner_tools_github::{ReleaseClient, ReleaseSource};
use tokio::process::Command;
use tracing::{debug, info};

/// Where a bundle comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// Cloned from a git remote.
    VersionControl,
    /// Latest release archive of an `owner/name` repository.
    PackagedRelease,
    /// An existing local directory.
    Filesystem,
}

impl FromStr for BundleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "git" | "version-control" => Ok(Self::VersionControl),
            "repo" | "packaged-release" | "release" => Ok(Self::PackagedRelease),
            "filesystem" | "local" => Ok(Self::Filesystem),
            other => Err(Error::invalid_config(
                "bundle type",
                format!("unknown bundle type '{other}', expected git, repo or filesystem"),
            )),
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VersionControl => "version-control",
            Self::PackagedRelease => "packaged-release",
            Self::Filesystem => "filesystem",
        })
    }
}

/// A named bundle and where to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLocation {
    /// Scratch namespace, e.g. `library` or `runner`.
    pub name: String,
    /// Location string; its meaning depends on `kind`.
    pub location: String,
    /// Source kind.
    pub kind: BundleKind,
}

impl BundleLocation {
    /// Create a bundle location.
    #[must_use]
    pub fn new(name: impl Into<String>, location: impl Into<String>, kind: BundleKind) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            kind,
        }
    }
}

/// Turns a [`BundleLocation`] of one kind into a local directory.
#[async_trait]
pub trait BundleProvider: Send + Sync {
    /// The kind this provider handles.
    fn kind(&self) -> BundleKind;

    /// Produce the directory tasks should be looked up in.
    async fn acquire(&self, bundle: &BundleLocation, scratch: &ScratchRoot) -> Result<PathBuf>;
}

/// Local directories are used as-is.
#[derive(Debug, Default)]
pub struct FilesystemProvider;

#[async_trait]
impl BundleProvider for FilesystemProvider {
    fn kind(&self) -> BundleKind {
        BundleKind::Filesystem
    }

    async fn acquire(&self, bundle: &BundleLocation, _scratch: &ScratchRoot) -> Result<PathBuf> {
        if bundle.location.trim().is_empty() {
            return Err(Error::invalid_location(&bundle.location, "filesystem location is empty"));
        }
        debug!(bundle = %bundle.name, dir = %bundle.location, "Using local bundle directory");
        Ok(PathBuf::from(&bundle.location))
    }
}

/// Shallow clone of a git remote through the `git` CLI.
#[derive(Debug)]
pub struct GitProvider {
    git: PathBuf,
    timeout: Option<Duration>,
}

impl GitProvider {
    /// Provider using `git` from `PATH`.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            git: PathBuf::from("git"),
            timeout,
        }
    }

    /// Use a specific git executable.
    #[must_use]
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    async fn clone_into(&self, location: &str, dest: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.git);
        cmd.arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(location)
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            None => cmd.output().await,
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| Error::timeout(format!("git clone of '{location}'"), limit.as_secs()))?,
        }
        .map_err(|e| Error::Clone {
            location: location.to_string(),
            message: format!("failed to run {}: {e}", self.git.display()),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Clone {
                location: location.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl BundleProvider for GitProvider {
    fn kind(&self) -> BundleKind {
        BundleKind::VersionControl
    }

    async fn acquire(&self, bundle: &BundleLocation, scratch: &ScratchRoot) -> Result<PathBuf> {
        if bundle.location.trim().is_empty() {
            return Err(Error::invalid_location(&bundle.location, "git location is empty"));
        }
        let dest = scratch.bundle_dir(&bundle.name)?;
        info!(bundle = %bundle.name, remote = %bundle.location, dest = ?dest, "Cloning bundle");
        self.clone_into(&bundle.location, &dest).await?;
        Ok(dest)
    }
}

/// Latest release archive of an `owner/name` repository.
#[derive(Debug)]
pub struct ReleaseProvider {
    client: ReleaseClient,
    platform: PlatformProfile,
}

impl ReleaseProvider {
    /// Create a provider fetching through `client`.
    #[must_use]
    pub fn new(client: ReleaseClient, platform: PlatformProfile) -> Self {
        Self { client, platform }
    }
}

#[async_trait]
impl BundleProvider for ReleaseProvider {
    fn kind(&self) -> BundleKind {
        BundleKind::PackagedRelease
    }

    async fn acquire(&self, bundle: &BundleLocation, scratch: &ScratchRoot) -> Result<PathBuf> {
        let source = ReleaseSource::for_bundle(&bundle.location, &self.platform)?;
        let work_dir = scratch.bundle_dir(&bundle.name)?;

        info!(bundle = %bundle.name, repo = %source.repository, "Downloading bundle release");
        let downloaded = self.client.download_latest(&source, &work_dir).await?;

        extract(&downloaded.path, &work_dir)?;
        let root = verify_extracted_root(&work_dir, &downloaded.asset.name)?;
        info!(bundle = %bundle.name, dir = ?root, "Bundle ready");
        Ok(root)
    }
}

/// Dispatches bundles to the provider for their kind.
pub struct BundleAcquirer {
    providers: Vec<Box<dyn BundleProvider>>,
}

impl fmt::Debug for BundleAcquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<BundleKind> = self.providers.iter().map(|p| p.kind()).collect();
        f.debug_struct("BundleAcquirer").field("providers", &kinds).finish()
    }
}

impl BundleAcquirer {
    /// An acquirer with no providers.
    #[must_use]
    pub fn empty() -> Self {
        Self { providers: Vec::new() }
    }

    /// An acquirer with the release, git and filesystem providers.
    #[must_use]
    pub fn new(client: ReleaseClient, platform: PlatformProfile, clone_timeout: Option<Duration>) -> Self {
        Self::empty()
            .with_provider(ReleaseProvider::new(client, platform))
            .with_provider(GitProvider::new(clone_timeout))
            .with_provider(FilesystemProvider)
    }

    /// Register a provider. A later provider for the same kind replaces the
    /// earlier one.
    #[must_use]
    pub fn with_provider(mut self, provider: impl BundleProvider + 'static) -> Self {
        self.providers.retain(|p| p.kind() != provider.kind());
        self.providers.push(Box::new(provider));
        self
    }

    /// Produce a local directory for `bundle`.
    pub async fn acquire(&self, bundle: &BundleLocation, scratch: &ScratchRoot) -> Result<PathBuf> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.kind() == bundle.kind)
            .ok_or_else(|| {
                Error::invalid_config("bundle type", format!("no provider registered for '{}'", bundle.kind))
            })?;

        debug!(bundle = %bundle.name, kind = %bundle.kind, location = %bundle.location, "Acquiring bundle");
        provider.acquire(bundle, scratch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrunner_core::ArchAlias;
    use tempfile::TempDir;

    #[test]
    fn test_kind_aliases() {
        for (text, kind) in [
            ("git", BundleKind::VersionControl),
            ("version-control", BundleKind::VersionControl),
            ("repo", BundleKind::PackagedRelease),
            ("Packaged-Release", BundleKind::PackagedRelease),
            ("release", BundleKind::PackagedRelease),
            ("filesystem", BundleKind::Filesystem),
            ("local", BundleKind::Filesystem),
        ] {
            assert_eq!(text.parse::<BundleKind>().unwrap(), kind, "{text}");
        }
        assert!(matches!(
            "svn".parse::<BundleKind>(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_filesystem_returns_location() {
        let scratch = ScratchRoot::temporary().unwrap();
        let bundle = BundleLocation::new("runner", "/srv/taskfiles", BundleKind::Filesystem);
        let dir = FilesystemProvider.acquire(&bundle, &scratch).await.unwrap();
        assert_eq!(dir, PathBuf::from("/srv/taskfiles"));
        assert!(!scratch.path().join("runner").exists());
    }

    #[tokio::test]
    async fn test_git_clone_failure_is_clone_error() {
        let scratch = ScratchRoot::temporary().unwrap();
        let missing = scratch.path().join("no-such-repo");
        let bundle = BundleLocation::new("runner", missing.to_string_lossy(), BundleKind::VersionControl);

        let err = GitProvider::new(Some(Duration::from_secs(30)))
            .acquire(&bundle, &scratch)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Clone { .. }));
    }

    #[tokio::test]
    async fn test_git_missing_binary_is_clone_error() {
        let scratch = ScratchRoot::temporary().unwrap();
        let bundle = BundleLocation::new("runner", "https://example.invalid/repo.git", BundleKind::VersionControl);

        let err = GitProvider::new(None)
            .with_git(scratch.path().join("no-git"))
            .acquire(&bundle, &scratch)
            .await
            .unwrap_err();
        match err {
            Error::Clone { location, message } => {
                assert_eq!(location, "https://example.invalid/repo.git");
                assert!(message.contains("no-git"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_git_clone_into_scratch() {
        let git_available = std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if !git_available {
            return;
        }

        let origin = TempDir::new().unwrap();
        let git = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
                .args(args)
                .current_dir(origin.path())
                .output()
                .unwrap()
                .status;
            assert!(status.success(), "git {args:?}");
        };
        git(&["init", "-q"]);
        std::fs::write(origin.path().join("Taskfile.yml"), "version: '3'\n").unwrap();
        git(&["add", "Taskfile.yml"]);
        git(&["commit", "-q", "-m", "init"]);

        let scratch = ScratchRoot::temporary().unwrap();
        let location = format!("file://{}", origin.path().display());
        let bundle = BundleLocation::new("library", location, BundleKind::VersionControl);
        let dir = GitProvider::new(Some(Duration::from_secs(60)))
            .acquire(&bundle, &scratch)
            .await
            .unwrap();

        assert_eq!(dir, scratch.path().join("library"));
        assert!(dir.join("Taskfile.yml").is_file());
    }

    #[tokio::test]
    async fn test_release_location_must_be_owner_name() {
        let scratch = ScratchRoot::temporary().unwrap();
        let platform = PlatformProfile::from_parts("linux", "x86_64", ArchAlias::Go).unwrap();
        let client = taskrunner_tools_github::ReleaseClient::new(
            "http://127.0.0.1:9",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        let bundle = BundleLocation::new("runner", "not-a-repo", BundleKind::PackagedRelease);

        let err = ReleaseProvider::new(client, platform)
            .acquire(&bundle, &scratch)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLocation { .. }));
    }

    #[tokio::test]
    async fn test_acquirer_without_provider() {
        let scratch = ScratchRoot::temporary().unwrap();
        let bundle = BundleLocation::new("runner", "/tmp", BundleKind::VersionControl);
        let acquirer = BundleAcquirer::empty().with_provider(FilesystemProvider);

        let err = acquirer.acquire(&bundle, &scratch).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_acquirer_dispatches_by_kind() {
        let scratch = ScratchRoot::temporary().unwrap();
        let bundle = BundleLocation::new("runner", "/srv/taskfiles", BundleKind::Filesystem);
        let acquirer = BundleAcquirer::empty()
            .with_provider(GitProvider::new(None))
            .with_provider(FilesystemProvider);

        let dir = acquirer.acquire(&bundle, &scratch).await.unwrap();
        assert_eq!(dir, PathBuf::from("/srv/taskfiles"));
    }
}
