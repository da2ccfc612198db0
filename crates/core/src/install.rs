//! Install directory for fetched tool binaries.
//!
//! The directory itself is the cache: `<dir>/<name><exe_suffix>` existing
//! with a non-zero size means the tool is installed. A zero-length file is
//! what an interrupted download leaves behind, so it is removed and reported
//! as missing.
//!
//! Callers must not run two invocations against the same directory at once;
//! the check-then-write below takes no lock.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::IoResultExt;
use crate::Result;

/// Default install directory on Linux and Darwin.
pub const UNIX_INSTALL_DIR: &str = "/opt/task-runner/bin";

/// Default install directory on Windows.
pub const WINDOWS_INSTALL_DIR: &str = r"C:\ProgramData\task-runner\bin";

/// Platform default for the install directory.
#[must_use]
pub fn default_install_dir(is_windows: bool) -> PathBuf {
    if is_windows {
        PathBuf::from(WINDOWS_INSTALL_DIR)
    } else {
        PathBuf::from(UNIX_INSTALL_DIR)
    }
}

/// Stable, cross-invocation directory holding tool binaries.
#[derive(Debug, Clone)]
pub struct InstallDir {
    root: PathBuf,
    exe_suffix: String,
}

impl InstallDir {
    /// Create a handle for `root`; nothing is touched on disk.
    #[must_use]
    pub fn new(root: PathBuf, exe_suffix: impl Into<String>) -> Self {
        Self {
            root,
            exe_suffix: exe_suffix.into(),
        }
    }

    /// The install directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the named binary.
    #[must_use]
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{}", self.exe_suffix))
    }

    /// Create the directory and its parents if absent.
    pub fn ensure(&self) -> Result<()> {
        if !self.root.is_dir() {
            debug!(dir = ?self.root, "Creating install directory");
            std::fs::create_dir_all(&self.root).with_path(&self.root, "create install directory")?;
        }
        Ok(())
    }

    /// Whether the named binary is present and non-empty.
    ///
    /// A zero-length file is deleted so the next check forces a download.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        let path = self.binary_path(name);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(binary = ?path, "Binary is not installed");
                return Ok(false);
            }
            Err(e) => return Err(crate::Error::io(e, Some(path), "inspect installed binary")),
        };

        if !meta.is_file() {
            info!(binary = ?path, "Install path is not a regular file");
            return Ok(false);
        }

        if meta.len() == 0 {
            warn!(binary = ?path, "Removing zero-length binary left by a failed download");
            std::fs::remove_file(&path).with_path(&path, "remove empty binary")?;
            return Ok(false);
        }

        debug!(binary = ?path, size = meta.len(), "Binary already installed");
        Ok(true)
    }

    /// Copy `source` into the directory as `name` and mark it executable.
    pub fn install_binary(&self, source: &Path, name: &str) -> Result<PathBuf> {
        self.ensure()?;
        let dest = self.binary_path(name);
        std::fs::copy(source, &dest).with_path(&dest, "copy binary into install directory")?;
        mark_executable(&dest)?;
        info!(binary = ?dest, "Installed binary");
        Ok(dest)
    }
}

/// Set the owner, group and other execute bits.
///
/// No-op on platforms without an executable bit.
pub fn mark_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)
            .with_path(path, "read permissions")?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms).with_path(path, "set executable permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
