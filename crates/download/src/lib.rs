//! Resumable, mirror-aware HTTP downloads for large OS images.
//!
//! # Pipeline
//!
//! 1. **Probe**: resolve a URL to size and `Last-Modified`, following manual
//!    redirects served behind placeholder pages ([`probe`])
//! 2. **Select**: pick the first reachable mirror, in priority order ([`mirror`])
//! 3. **Validate**: decide whether a persisted [`TransferStatus`] may resume
//!    ([`validate`])
//! 4. **Transfer**: stream the body with adaptive chunking, a stall watchdog,
//!    and best-effort progress events ([`engine`])
//!
//! The caller owns persistence of the status record and any post-processing
//! of the finished file.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod mirror;
pub mod probe;
pub mod progress;
pub mod status;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

pub use cache::{NoopRemoteUrlCache, RemoteUrlCache};
pub use config::DownloaderConfig;
pub use engine::AdaptiveChunk;
pub use error::{DownloadError, ProbeError};
pub use mirror::{SelectedMirror, select_first_reachable};
pub use probe::{MetadataProbe, RemoteMeta};
pub use progress::ProgressEvent;
pub use status::TransferStatus;
pub use validate::{ResumeDecision, RestartReason, check_resume, verify_status};

/// HTTP downloader shared by every session of a process.
///
/// Holds two clients over the same settings: one following redirects for
/// metadata and transfers, and one that never follows them, used to read the
/// `Location` of mirrors hiding a redirect behind a placeholder page.
pub struct Downloader {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
    config: DownloaderConfig,
    remote_cache: Arc<dyn RemoteUrlCache>,
    remote_cache_enabled: bool,
}

impl Downloader {
    /// Creates a downloader with default settings and no remote URL cache.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_config(DownloaderConfig::default())
    }

    /// Creates a downloader with explicit settings.
    pub fn with_config(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let config = config.normalized();

        let client = reqwest::Client::builder().http1_only().build()?;
        let no_redirect = reqwest::Client::builder()
            .http1_only()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            client,
            no_redirect,
            config,
            remote_cache: Arc::new(NoopRemoteUrlCache),
            remote_cache_enabled: false,
        })
    }

    /// Installs a remote URL cache.
    pub fn with_remote_url_cache(mut self, cache: Arc<dyn RemoteUrlCache>) -> Self {
        self.remote_cache = cache;
        self.remote_cache_enabled = true;
        self
    }

    /// The effective (normalized) configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// The redirect-following client, for auxiliary requests such as
    /// version indexes.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn remote_url_cache_enabled(&self) -> bool {
        self.remote_cache_enabled
    }

    /// Records a working mirror for `key` in the remote cache.
    pub async fn put_remote_url(&self, key: &str, url: &str) -> Result<(), DownloadError> {
        if !self.remote_cache_enabled {
            return Err(DownloadError::CacheDisabled);
        }
        self.remote_cache.put(key, url).await
    }

    /// Returns the mirrors the remote cache knows for `key`.
    pub async fn get_remote_urls(&self, key: &str) -> Result<Vec<String>, DownloadError> {
        if !self.remote_cache_enabled {
            return Err(DownloadError::CacheDisabled);
        }
        self.remote_cache.get(key).await
    }
}
