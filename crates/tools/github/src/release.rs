//! Release sources, metadata and asset resolution.

use regex::Regex;
use serde::Deserialize;
use taskrunner_core::{Error, PlatformProfile, Result};
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

use crate::template::{AssetTemplate, Placeholder};

/// Latest-release metadata as published by the release API.
///
/// `tag_name` and `assets` are required; parsing fails naming the field when
/// either is absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseMetadata {
    /// Human readable release name. Not every release sets one.
    #[serde(rename = "name", default)]
    pub display_name: Option<String>,
    /// Release tag, e.g. `v1.2.0`.
    #[serde(rename = "tag_name")]
    pub tag_version: String,
    /// Published assets in API order.
    #[serde(rename = "assets")]
    pub asset_list: Vec<ReleaseAsset>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

impl ReleaseMetadata {
    /// Parse a response body from `url` for `repo`.
    pub fn parse(repo: &str, url: &str, body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Err(Error::metadata_fetch(repo, url, "empty response body"));
        }
        let de = &mut serde_json::Deserializer::from_str(body);
        serde_path_to_error::deserialize(de).map_err(|e| {
            Error::metadata_fetch(
                repo,
                url,
                format!("invalid release metadata at '{}': {}", e.path(), e.inner()),
            )
        })
    }

    /// Names of all published assets, in order.
    #[must_use]
    pub fn asset_names(&self) -> Vec<String> {
        self.asset_list.iter().map(|a| a.name.clone()).collect()
    }
}

/// The asset selected from a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub download_url: String,
}

/// One queryable release: a repository plus the values its asset template
/// is rendered with.
///
/// Metadata is fetched at most once per instance and kept for its lifetime.
#[derive(Debug)]
pub struct ReleaseSource {
    /// Repository identifier (`owner/name`).
    pub repository: String,
    /// Asset base name.
    pub base_name: String,
    /// OS tag; empty for bundles without platform tagging.
    pub os_tag: String,
    /// Architecture tag; empty for bundles without platform tagging.
    pub arch_tag: String,
    /// Separator between name parts.
    pub separator: String,
    /// Template the search expression is built from.
    pub template: AssetTemplate,
    /// Archive suffix of the platform.
    pub archive_suffix: String,
    pub(crate) metadata: OnceCell<ReleaseMetadata>,
}

impl ReleaseSource {
    /// Source for a platform-tagged tool release, e.g. `task_linux_amd64.tar.gz`.
    #[must_use]
    pub fn for_tool(
        repository: impl Into<String>,
        base_name: impl Into<String>,
        platform: &PlatformProfile,
    ) -> Self {
        Self {
            repository: repository.into(),
            base_name: base_name.into(),
            os_tag: platform.os_name.clone(),
            arch_tag: platform.arch_tag().to_string(),
            separator: "_".to_string(),
            template: AssetTemplate::platform(),
            archive_suffix: platform.archive_suffix.clone(),
            metadata: OnceCell::new(),
        }
    }

    /// Source for a packaged bundle release at `owner/name`.
    ///
    /// The base name is the repository's short name and the asset is
    /// matched as `<name>-<tag><archive suffix>`.
    pub fn for_bundle(location: &str, platform: &PlatformProfile) -> Result<Self> {
        let (_, short_name) = split_repository(location)?;
        Ok(Self {
            repository: location.to_string(),
            base_name: short_name.to_string(),
            os_tag: String::new(),
            arch_tag: String::new(),
            separator: "-".to_string(),
            template: AssetTemplate::versioned(),
            archive_suffix: platform.archive_suffix.clone(),
            metadata: OnceCell::new(),
        })
    }

    /// Replace the asset template.
    #[must_use]
    pub fn with_template(mut self, template: AssetTemplate) -> Self {
        self.template = template;
        self
    }

    /// Replace the separator.
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Metadata, if it has been fetched.
    #[must_use]
    pub fn metadata(&self) -> Option<&ReleaseMetadata> {
        self.metadata.get()
    }

    /// Compile the search expression; `{version}` is the release tag.
    pub fn search_regex(&self, metadata: &ReleaseMetadata) -> Result<Regex> {
        self.template.compile(|p| self.placeholder_value(p, metadata))
    }

    fn placeholder_value<'a>(&'a self, placeholder: Placeholder, metadata: &'a ReleaseMetadata) -> Option<&'a str> {
        match placeholder {
            Placeholder::BaseName => Some(self.base_name.as_str()),
            Placeholder::Separator => Some(self.separator.as_str()),
            Placeholder::OsTag => Some(self.os_tag.as_str()),
            Placeholder::ArchTag => Some(self.arch_tag.as_str()),
            Placeholder::CompressExt => Some(self.archive_suffix.as_str()),
            Placeholder::Version => Some(metadata.tag_version.as_str()),
        }
    }
}

/// Split `owner/name` into its two parts.
pub fn split_repository(location: &str) -> Result<(&str, &str)> {
    let mut parts = location.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Ok((owner, name))
        }
        _ => Err(Error::invalid_location(
            location,
            "expected a repository identifier of the form 'owner/name'",
        )),
    }
}

/// Pick the asset whose name matches the source's search expression.
///
/// Assets are scanned in published order and the first match wins. More
/// than one match is logged as a warning.
pub fn resolve_asset(source: &ReleaseSource, metadata: &ReleaseMetadata) -> Result<ResolvedAsset> {
    let regex = source.search_regex(metadata)?;
    let pattern = regex.as_str().to_string();

    let matches: Vec<&ReleaseAsset> = metadata
        .asset_list
        .iter()
        .filter(|asset| regex.is_match(&asset.name))
        .collect();

    let Some(first) = matches.first() else {
        let available = metadata.asset_names();
        debug!(repo = %source.repository, ?available, "Published assets");
        error!(
            repo = %source.repository,
            %pattern,
            template = %source.template,
            "No release asset matched"
        );
        return Err(Error::AssetNotFound {
            repo: source.repository.clone(),
            pattern,
            available,
        });
    };

    if matches.len() > 1 {
        let candidates: Vec<&str> = matches.iter().map(|a| a.name.as_str()).collect();
        warn!(
            repo = %source.repository,
            %pattern,
            ?candidates,
            chosen = %first.name,
            "Multiple release assets matched, using the first in published order"
        );
    }

    debug!(repo = %source.repository, asset = %first.name, url = %first.download_url, "Resolved release asset");
    Ok(ResolvedAsset {
        name: first.name.clone(),
        download_url: first.download_url.clone(),
    })
}
