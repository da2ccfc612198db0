//! Archive extraction for release assets.
//!
//! Dispatch is purely by file name suffix: `.zip` goes through the zip
//! reader, `.tar.gz`/`.tgz` through gzip + tar. Every member is checked
//! before anything is written; a member that would land outside the
//! destination fails the whole extraction.

use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, trace};

use crate::error::IoResultExt;
use crate::{Error, Result};

/// Archive formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.tar.gz`
    TarGz,
    /// `.tgz`
    Tgz,
}

impl ArchiveKind {
    /// Detect the format from a file name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tgz") {
            Some(Self::Tgz)
        } else {
            None
        }
    }

    /// Detect the format from a path's file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_name)
    }

    /// Length of the suffix this format strips from a file name.
    const fn suffix_len(self) -> usize {
        match self {
            Self::Zip | Self::Tgz => 4,
            Self::TarGz => 7,
        }
    }

    /// Strip this format's suffix from `name`.
    ///
    /// One extension for `.zip`/`.tgz`, two for `.tar.gz`.
    #[must_use]
    pub fn strip_suffix(self, name: &str) -> String {
        let keep = name.len().saturating_sub(self.suffix_len());
        name.get(..keep).unwrap_or(name).to_string()
    }
}

/// Extract every member of `archive` into `dest`.
///
/// Returns the paths written, in archive order.
pub fn extract(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| Error::UnsupportedArchive {
        path: archive.to_path_buf(),
    })?;

    debug!(?archive, ?dest, ?kind, "Extracting archive");
    let written = match kind {
        ArchiveKind::Zip => extract_zip(archive, dest)?,
        ArchiveKind::TarGz | ArchiveKind::Tgz => extract_tar_gz(archive, dest)?,
    };
    debug!(?archive, members = written.len(), "Extracted archive");
    Ok(written)
}

/// Directory an archive is expected to unpack into, relative to `dest`.
///
/// Release archives carry one top-level directory named after the archive
/// minus its suffix, e.g. `bundle-v1.2.0.tar.gz` -> `bundle-v1.2.0/`.
pub fn expected_root(dest: &Path, asset_name: &str) -> Result<PathBuf> {
    let kind = ArchiveKind::from_name(asset_name).ok_or_else(|| Error::UnsupportedArchive {
        path: PathBuf::from(asset_name),
    })?;
    Ok(dest.join(kind.strip_suffix(asset_name)))
}

/// Check that [`expected_root`] exists as a directory after extraction.
pub fn verify_extracted_root(dest: &Path, asset_name: &str) -> Result<PathBuf> {
    let root = expected_root(dest, asset_name)?;
    if root.is_dir() {
        Ok(root)
    } else {
        Err(Error::ExtractionIncomplete {
            scratch_dir: dest.to_path_buf(),
            asset_dir: root,
            asset_name: asset_name.to_string(),
        })
    }
}

/// Relative path of a member that stays inside its destination.
///
/// Rejects absolute paths, drive prefixes and any `..` that climbs above
/// the destination root.
fn contained_path(member: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in member.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Whether a link stored at `member` pointing to `target` stays inside.
fn link_is_contained(member: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return false;
    }
    let base = member.parent().unwrap_or_else(|| Path::new(""));
    contained_path(&base.join(target)).is_some()
}

fn unsafe_entry(archive: &Path, entry: impl Into<String>) -> Error {
    Error::UnsafeArchiveEntry {
        archive: archive.to_path_buf(),
        entry: entry.into(),
    }
}

fn open_tar(archive: &Path) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(archive).with_path(archive, "open archive")?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    // First pass validates every member without writing.
    let mut reader = open_tar(archive)?;
    for entry in reader.entries().with_path(archive, "read tar entries")? {
        let entry = entry.with_path(archive, "read tar entry")?;
        let path = entry.path().with_path(archive, "read tar entry path")?;
        if contained_path(&path).is_none() {
            return Err(unsafe_entry(archive, path.to_string_lossy()));
        }
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let target = entry
                .link_name()
                .with_path(archive, "read tar link target")?
                .map(|t| t.into_owned())
                .unwrap_or_default();
            if !link_is_contained(&path, &target) {
                return Err(unsafe_entry(
                    archive,
                    format!("{} -> {}", path.display(), target.display()),
                ));
            }
        }
    }

    std::fs::create_dir_all(dest).with_path(dest, "create extraction directory")?;

    let mut reader = open_tar(archive)?;
    reader.set_preserve_permissions(true);
    let mut written = Vec::new();
    for entry in reader.entries().with_path(archive, "read tar entries")? {
        let mut entry = entry.with_path(archive, "read tar entry")?;
        let rel = entry
            .path()
            .with_path(archive, "read tar entry path")?
            .into_owned();
        trace!(member = ?rel, "Unpacking");
        let unpacked = entry.unpack_in(dest).with_path(dest, "unpack tar entry")?;
        if !unpacked {
            return Err(unsafe_entry(archive, rel.to_string_lossy()));
        }
        if let Some(clean) = contained_path(&rel) {
            written.push(dest.join(clean));
        }
    }
    Ok(written)
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).with_path(archive, "open archive")?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        Error::io(
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            Some(archive.to_path_buf()),
            "read zip archive",
        )
    })?;

    let zip_err = |e: zip::result::ZipError| {
        Error::io(
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            Some(archive.to_path_buf()),
            "read zip entry",
        )
    };

    // First pass validates every member without writing.
    let mut members = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let file = zip.by_index(i).map_err(zip_err)?;
        match file.enclosed_name() {
            Some(path) => members.push(path),
            None => return Err(unsafe_entry(archive, file.name())),
        }
    }

    std::fs::create_dir_all(dest).with_path(dest, "create extraction directory")?;

    let mut written = Vec::with_capacity(members.len());
    for (i, rel) in members.into_iter().enumerate() {
        let mut file = zip.by_index(i).map_err(zip_err)?;
        let outpath = dest.join(&rel);
        trace!(member = ?rel, "Unpacking");

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).with_path(&outpath, "create directory")?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).with_path(parent, "create directory")?;
            }
            let mut out = File::create(&outpath).with_path(&outpath, "create file")?;
            std::io::copy(&mut file, &mut out).with_path(&outpath, "write file")?;

            #[cfg(unix)]
            if let Some(mode) = file.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                    .with_path(&outpath, "set permissions")?;
            }
        }
        written.push(outpath);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_tarball(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            builder.append_data(&mut header, name, &content[..]).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    /// Writes a raw header so unsafe names reach the archive unchecked.
    fn create_raw_tarball(path: &Path, name: &str, content: &[u8]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_old();
        {
            let bytes = header.as_old_mut();
            bytes.name[..name.len()].copy_from_slice(name.as_bytes());
        }
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn create_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_kind_detection() {
        assert_eq!(ArchiveKind::from_name("task_windows_amd64.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_name("task_linux_amd64.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_name("bundle.tgz"), Some(ArchiveKind::Tgz));
        assert_eq!(ArchiveKind::from_name("task_linux_amd64.deb"), None);
        assert_eq!(ArchiveKind::from_name("checksums.txt"), None);
    }

    #[test]
    fn test_strip_suffix() {
        assert_eq!(ArchiveKind::TarGz.strip_suffix("bundle-v1.2.0.tar.gz"), "bundle-v1.2.0");
        assert_eq!(ArchiveKind::Zip.strip_suffix("bundle-v1.2.0.zip"), "bundle-v1.2.0");
        assert_eq!(ArchiveKind::Tgz.strip_suffix("bundle.tgz"), "bundle");
    }

    #[test]
    fn test_extract_tar_gz_all_members() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle-v1.2.0.tar.gz");
        create_tarball(
            &archive,
            &[
                ("bundle-v1.2.0/Taskfile.yml", b"version: '3'"),
                ("bundle-v1.2.0/tasks/build.yml", b"tasks: {}"),
            ],
        );

        let dest = temp.path().join("out");
        let written = extract(&archive, &dest).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dest.join("bundle-v1.2.0/Taskfile.yml")).unwrap(),
            "version: '3'"
        );
        assert!(dest.join("bundle-v1.2.0/tasks/build.yml").is_file());
    }

    #[test]
    fn test_extract_zip_all_members() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle-v1.2.0.zip");
        create_zip(
            &archive,
            &[
                ("bundle-v1.2.0/Taskfile.yml", b"version: '3'"),
                ("bundle-v1.2.0/nested/file.txt", b"nested"),
            ],
        );

        let dest = temp.path().join("out");
        extract(&archive, &dest).unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.join("bundle-v1.2.0/nested/file.txt")).unwrap(),
            "nested"
        );
        assert!(verify_extracted_root(&dest, "bundle-v1.2.0.zip").is_ok());
    }

    #[test]
    fn test_unsupported_suffix_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle.rar");
        std::fs::write(&archive, b"not an archive").unwrap();

        let dest = temp.path().join("out");
        let err = extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, Error::UnsupportedArchive { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_tar_traversal_is_rejected_before_writing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.tar.gz");
        create_raw_tarball(&archive, "../escape.txt", b"pwned");

        let dest = temp.path().join("out");
        let err = extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, Error::UnsafeArchiveEntry { ref entry, .. } if entry.contains("escape")));
        assert!(!temp.path().join("escape.txt").exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_zip_traversal_is_rejected_before_writing() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        create_zip(&archive, &[("ok.txt", b"fine"), ("../escape.txt", b"pwned")]);

        let dest = temp.path().join("out");
        let err = extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, Error::UnsafeArchiveEntry { .. }));
        assert!(!dest.join("ok.txt").exists());
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_contained_path() {
        assert_eq!(contained_path(Path::new("a/b")), Some(PathBuf::from("a/b")));
        assert_eq!(contained_path(Path::new("./a/../b")), Some(PathBuf::from("b")));
        assert_eq!(contained_path(Path::new("../a")), None);
        assert_eq!(contained_path(Path::new("a/../../b")), None);
        assert_eq!(contained_path(Path::new("/etc/passwd")), None);
    }

    #[test]
    fn test_link_containment() {
        assert!(link_is_contained(Path::new("dir/link"), Path::new("../file")));
        assert!(!link_is_contained(Path::new("dir/link"), Path::new("../../file")));
        assert!(!link_is_contained(Path::new("link"), Path::new("/etc/passwd")));
    }

    #[test]
    fn test_verify_missing_root_names_everything() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle-v1.2.0.tar.gz");
        // Archive without the conventional top-level directory
        create_tarball(&archive, &[("Taskfile.yml", b"version: '3'")]);
        extract(&archive, temp.path()).unwrap();

        let err = verify_extracted_root(temp.path(), "bundle-v1.2.0.tar.gz").unwrap_err();
        match err {
            Error::ExtractionIncomplete {
                scratch_dir,
                asset_dir,
                asset_name,
            } => {
                assert_eq!(scratch_dir, temp.path());
                assert_eq!(asset_dir, temp.path().join("bundle-v1.2.0"));
                assert_eq!(asset_name, "bundle-v1.2.0.tar.gz");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
