//! GitHub Releases resolver for task-runner.
//!
//! Finds the one asset of a repository's latest release that matches a
//! platform or version pattern and streams it to disk. Supports:
//! - Typed asset templates: `{base_name}`, `{separator}`, `{os_tag}`,
//!   `{arch_tag}`, `{version}`, `{compress_ext}`
//! - First-match-wins resolution in published order
//! - Bearer token authentication
//! - SHA-256 digest logging of every download

pub mod client;
pub mod release;
pub mod template;

pub use client::{DEFAULT_API_BASE, DEFAULT_HTTP_TIMEOUT, DownloadedAsset, ReleaseClient};
pub use release::{
    ReleaseAsset, ReleaseMetadata, ReleaseSource, ResolvedAsset, resolve_asset, split_repository,
};
pub use template::{AssetTemplate, Placeholder};
