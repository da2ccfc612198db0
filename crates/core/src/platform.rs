//! Platform detection and suffix tables.
//!
//! Handles mapping between:
//! - host identifiers (`std::env::consts`, e.g. "macos", "aarch64")
//! - release naming (e.g. "darwin", "arm64", "amd64")
//!
//! Anything outside the table is a hard error; a guessed suffix would send
//! every later download and extraction after the wrong file.

use std::fmt;

use crate::{Error, Result};

/// How the architecture is spelled in release asset names.
///
/// The alias is only applied when the caller asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchAlias {
    /// Use the normalized host name (`x86_64`, `aarch64`).
    #[default]
    Native,
    /// Go-style names used by most Go release tooling (`amd64`, `arm64`).
    Go,
}

/// Normalized description of the current host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    /// Lower-cased OS name (linux, darwin, windows).
    pub os_name: String,
    /// Normalized architecture name (x86_64, aarch64).
    pub arch_name: String,
    /// Architecture spelling for asset names when an alias was requested.
    pub arch_alias: Option<String>,
    /// Executable suffix (".exe" on Windows, empty otherwise).
    pub exe_suffix: String,
    /// Release archive suffix (".zip" on Windows, ".tar.gz" otherwise).
    pub archive_suffix: String,
}

impl PlatformProfile {
    /// Build a profile from raw OS and architecture identifiers.
    ///
    /// Identifiers are lower-cased before lookup.
    pub fn from_parts(os: &str, arch: &str, alias: ArchAlias) -> Result<Self> {
        let os_lower = os.to_lowercase();
        let arch_lower = arch.to_lowercase();

        let (os_name, exe_suffix, archive_suffix) = match os_lower.as_str() {
            "linux" => ("linux", "", ".tar.gz"),
            "darwin" | "macos" => ("darwin", "", ".tar.gz"),
            "windows" => ("windows", ".exe", ".zip"),
            _ => return Err(Error::unsupported_platform(os_lower, arch_lower)),
        };

        let arch_name = match arch_lower.as_str() {
            "x86_64" | "amd64" | "x64" => "x86_64",
            "aarch64" | "arm64" => "aarch64",
            _ => return Err(Error::unsupported_platform(os_lower, arch_lower)),
        };

        let arch_alias = match (alias, arch_name) {
            (ArchAlias::Native, _) => None,
            (ArchAlias::Go, "x86_64") => Some("amd64".to_string()),
            (ArchAlias::Go, _) => Some("arm64".to_string()),
        };

        Ok(Self {
            os_name: os_name.to_string(),
            arch_name: arch_name.to_string(),
            arch_alias,
            exe_suffix: exe_suffix.to_string(),
            archive_suffix: archive_suffix.to_string(),
        })
    }

    /// Architecture spelling to put in asset names.
    #[must_use]
    pub fn arch_tag(&self) -> &str {
        self.arch_alias.as_deref().unwrap_or(&self.arch_name)
    }

    /// Whether this is the Windows family.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os_name == "windows"
    }

    /// File name of an executable on this platform.
    #[must_use]
    pub fn executable_name(&self, name: &str) -> String {
        format!("{name}{}", self.exe_suffix)
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os_name, self.arch_tag())
    }
}

/// Resolve the profile of the running host.
pub fn resolve_platform(alias: ArchAlias) -> Result<PlatformProfile> {
    PlatformProfile::from_parts(std::env::consts::OS, std::env::consts::ARCH, alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_table() {
        let cases = [
            ("linux", "x86_64", "", ".tar.gz"),
            ("linux", "aarch64", "", ".tar.gz"),
            ("darwin", "x86_64", "", ".tar.gz"),
            ("macos", "arm64", "", ".tar.gz"),
            ("windows", "x86_64", ".exe", ".zip"),
            ("windows", "aarch64", ".exe", ".zip"),
        ];
        for (os, arch, exe, archive) in cases {
            let p = PlatformProfile::from_parts(os, arch, ArchAlias::Native).unwrap();
            assert_eq!(p.exe_suffix, exe, "{os}-{arch}");
            assert_eq!(p.archive_suffix, archive, "{os}-{arch}");
        }
    }

    #[test]
    fn test_identifiers_are_lowercased() {
        let p = PlatformProfile::from_parts("Darwin", "ARM64", ArchAlias::Native).unwrap();
        assert_eq!(p.os_name, "darwin");
        assert_eq!(p.arch_name, "aarch64");
    }

    #[test]
    fn test_unsupported_os() {
        let err = PlatformProfile::from_parts("freebsd", "x86_64", ArchAlias::Native).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { ref os, .. } if os == "freebsd"));
    }

    #[test]
    fn test_unsupported_arch() {
        let err = PlatformProfile::from_parts("linux", "riscv64", ArchAlias::Go).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { ref arch, .. } if arch == "riscv64"));
    }

    #[test]
    fn test_alias_only_when_requested() {
        let native = PlatformProfile::from_parts("linux", "x86_64", ArchAlias::Native).unwrap();
        assert_eq!(native.arch_alias, None);
        assert_eq!(native.arch_tag(), "x86_64");

        let go = PlatformProfile::from_parts("linux", "x86_64", ArchAlias::Go).unwrap();
        assert_eq!(go.arch_alias.as_deref(), Some("amd64"));
        assert_eq!(go.arch_tag(), "amd64");

        let go_arm = PlatformProfile::from_parts("darwin", "aarch64", ArchAlias::Go).unwrap();
        assert_eq!(go_arm.arch_tag(), "arm64");
    }

    #[test]
    fn test_executable_name() {
        let win = PlatformProfile::from_parts("windows", "x86_64", ArchAlias::Go).unwrap();
        assert_eq!(win.executable_name("task"), "task.exe");
        assert!(win.is_windows());

        let linux = PlatformProfile::from_parts("linux", "x86_64", ArchAlias::Go).unwrap();
        assert_eq!(linux.executable_name("task"), "task");
    }

    #[test]
    fn test_display() {
        let p = PlatformProfile::from_parts("linux", "amd64", ArchAlias::Go).unwrap();
        assert_eq!(p.to_string(), "linux-amd64");
    }

    #[test]
    fn test_current_platform() {
        let p = resolve_platform(ArchAlias::Native).unwrap();
        assert!(!p.os_name.is_empty());
        assert!(!p.archive_suffix.is_empty());
    }
}
