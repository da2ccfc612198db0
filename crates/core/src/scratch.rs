//! Process-wide scratch root for downloads and extractions.
//!
//! Created once per run. Each bundle gets its own subdirectory named after
//! the bundle so "library" and "runner" never collide. The owner decides
//! whether the tree is removed on drop.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::error::IoResultExt;
use crate::Result;

#[derive(Debug)]
enum Backing {
    Temporary(TempDir),
    Persistent(PathBuf),
}

/// Ephemeral directory holding all downloads for one invocation.
#[derive(Debug)]
pub struct ScratchRoot {
    backing: Backing,
}

impl ScratchRoot {
    /// Create a fresh temporary directory that is removed on drop.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("task-runner-")
            .tempdir()
            .map_err(|e| crate::Error::io(e, Some(std::env::temp_dir()), "create scratch root"))?;
        debug!(scratch = ?dir.path(), "Created scratch root");
        Ok(Self {
            backing: Backing::Temporary(dir),
        })
    }

    /// Create a fresh temporary directory that is kept after exit.
    pub fn kept() -> Result<Self> {
        let dir = Self::temporary()?;
        match dir.backing {
            Backing::Temporary(tmp) => Ok(Self {
                backing: Backing::Persistent(tmp.keep()),
            }),
            persistent @ Backing::Persistent(_) => Ok(Self {
                backing: persistent,
            }),
        }
    }

    /// Use an existing directory, creating it if needed. Never removed.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path).with_path(&path, "create scratch root")?;
        Ok(Self {
            backing: Backing::Persistent(path),
        })
    }

    /// The scratch root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Temporary(dir) => dir.path(),
            Backing::Persistent(path) => path,
        }
    }

    /// Working directory for a named bundle, created on first use.
    pub fn bundle_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path().join(name);
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir).with_path(&dir, "create bundle working directory")?;
            debug!(bundle = name, dir = ?dir, "Created bundle working directory");
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_is_removed_on_drop() {
        let scratch = ScratchRoot::temporary().unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.is_dir());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_survives_drop() {
        let scratch = ScratchRoot::kept().unwrap();
        let path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(path.is_dir());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn test_bundle_dirs_are_namespaced() {
        let scratch = ScratchRoot::temporary().unwrap();
        let library = scratch.bundle_dir("library").unwrap();
        let runner = scratch.bundle_dir("runner").unwrap();

        assert_ne!(library, runner);
        assert_eq!(library, scratch.path().join("library"));
        assert!(runner.is_dir());

        // Second call reuses the directory
        std::fs::write(runner.join("marker"), b"x").unwrap();
        let again = scratch.bundle_dir("runner").unwrap();
        assert!(again.join("marker").exists());
    }

    #[test]
    fn test_at_existing_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("scratch");
        let scratch = ScratchRoot::at(&root).unwrap();
        assert_eq!(scratch.path(), root);
        drop(scratch);
        assert!(root.is_dir());
    }
}
