//! HTTP client for the release API and asset downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use sha2::{Digest, Sha256};
use taskrunner_core::{Error, IoResultExt, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::release::{ReleaseMetadata, ReleaseSource, ResolvedAsset, resolve_asset};

/// Default release API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!("task-runner/", env!("CARGO_PKG_VERSION"));

/// A downloaded release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedAsset {
    /// The asset that was selected.
    pub asset: ResolvedAsset,
    /// Where it was written.
    pub path: PathBuf,
    /// Hex SHA-256 of the bytes written.
    pub sha256: String,
}

/// Client for latest-release queries and asset downloads.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    http: Client,
    api_base: String,
    token: Option<String>,
}

impl ReleaseClient {
    /// Create a client against `api_base`, sending `token` as a bearer
    /// credential when present.
    pub fn new(api_base: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let api_base = api_base.into();
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::download(&api_base, format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Latest-release endpoint for `repository`.
    #[must_use]
    pub fn latest_release_url(&self, repository: &str) -> String {
        format!("{}/repos/{repository}/releases/latest", self.api_base)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch and cache the latest-release metadata of `source`.
    ///
    /// Only the first call performs a request; later calls return the
    /// cached value.
    pub async fn fetch_latest_metadata<'s>(&self, source: &'s ReleaseSource) -> Result<&'s ReleaseMetadata> {
        if source.metadata().is_some() {
            debug!(repo = %source.repository, "Release metadata already fetched");
        }
        source
            .metadata
            .get_or_try_init(|| self.request_metadata(&source.repository))
            .await
    }

    async fn request_metadata(&self, repository: &str) -> Result<ReleaseMetadata> {
        let url = self.latest_release_url(repository);
        debug!(%url, repo = %repository, "Fetching latest release metadata");

        let response = self
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::metadata_fetch(repository, &url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::metadata_fetch(repository, &url, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::metadata_fetch(repository, &url, format!("failed to read body: {e}")))?;

        let metadata = ReleaseMetadata::parse(repository, &url, &body)?;
        info!(
            repo = %repository,
            release = metadata.display_name.as_deref().unwrap_or(""),
            tag = %metadata.tag_version,
            assets = metadata.asset_list.len(),
            "Fetched latest release metadata"
        );
        Ok(metadata)
    }

    /// Stream `download_url` into `dest`, returning the hex SHA-256 of the
    /// bytes written.
    ///
    /// The file is created before the first byte arrives, so a failure
    /// mid-stream can leave a short or empty file behind.
    pub async fn download_asset(&self, download_url: &str, dest: &Path) -> Result<String> {
        debug!(url = %download_url, dest = ?dest, "Downloading asset");

        let mut response = self
            .get(download_url)
            .send()
            .await
            .map_err(|e| Error::download(download_url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::download(download_url, format!("HTTP {status}")));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_path(parent, "create download directory")?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_path(dest, "create download file")?;

        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::download(download_url, format!("stream interrupted: {e}")))?
        {
            hasher.update(&chunk);
            file.write_all(&chunk).await.with_path(dest, "write download")?;
            written += chunk.len() as u64;
        }
        file.flush().await.with_path(dest, "flush download")?;

        let sha256 = hex::encode(hasher.finalize());
        info!(url = %download_url, dest = ?dest, bytes = written, %sha256, "Downloaded asset");
        Ok(sha256)
    }

    /// Resolve the matching asset of the latest release and download it
    /// into `dest_dir` under its published name.
    pub async fn download_latest(&self, source: &ReleaseSource, dest_dir: &Path) -> Result<DownloadedAsset> {
        let metadata = self.fetch_latest_metadata(source).await?;
        let asset = resolve_asset(source, metadata)?;

        let file_name = Path::new(&asset.name)
            .file_name()
            .filter(|n| *n == asset.name.as_str())
            .ok_or_else(|| {
                Error::download(&asset.download_url, format!("asset name '{}' is not a plain file name", asset.name))
            })?;
        let path = dest_dir.join(file_name);

        let sha256 = self.download_asset(&asset.download_url, &path).await?;
        Ok(DownloadedAsset { asset, path, sha256 })
    }
}
