//! The seam between session logic and the HTTP downloader.
//!
//! [`ArtifactFetcher`] is implemented by [`Downloader`]; tests substitute a
//! scripted fetcher so session flows run without a network.

use fastpve_download::{
    DownloadError, Downloader, MetadataProbe, ProgressEvent, RemoteMeta, TransferStatus,
};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything a download session needs from the network side.
pub trait ArtifactFetcher: MetadataProbe {
    /// Runs a resumable transfer, updating `status` in place.
    fn resumable_download<'a>(
        &'a self,
        url: &'a str,
        status: &'a mut TransferStatus,
        progress: Option<&'a mpsc::Sender<ProgressEvent>>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), DownloadError>>;

    /// GETs a small text document such as a version index.
    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, DownloadError>>;

    fn remote_url_cache_enabled(&self) -> bool;

    fn put_remote_url<'a>(
        &'a self,
        key: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), DownloadError>>;

    fn get_remote_urls<'a>(&'a self, key: &'a str)
    -> BoxFuture<'a, Result<Vec<String>, DownloadError>>;

    /// Checks a saved record against fresh remote metadata.
    fn verify_status(&self, status: &TransferStatus, remote: &RemoteMeta) -> bool {
        fastpve_download::verify_status(status, remote)
    }
}

impl ArtifactFetcher for Downloader {
    fn resumable_download<'a>(
        &'a self,
        url: &'a str,
        status: &'a mut TransferStatus,
        progress: Option<&'a mpsc::Sender<ProgressEvent>>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), DownloadError>> {
        Box::pin(Downloader::resumable_download(self, url, status, progress, cancel))
    }

    fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, DownloadError>> {
        Box::pin(async move {
            let resp = self
                .client()
                .get(url)
                .timeout(self.config().probe_timeout)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(DownloadError::HttpStatus(status.as_u16()));
            }
            Ok(resp.text().await?)
        })
    }

    fn remote_url_cache_enabled(&self) -> bool {
        Downloader::remote_url_cache_enabled(self)
    }

    fn put_remote_url<'a>(
        &'a self,
        key: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), DownloadError>> {
        Box::pin(Downloader::put_remote_url(self, key, url))
    }

    fn get_remote_urls<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, DownloadError>> {
        Box::pin(Downloader::get_remote_urls(self, key))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted fetcher for session tests.

    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use fastpve_download::ProbeError;

    use super::*;

    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        /// Reachable URLs and their metadata.
        pub metas: HashMap<String, RemoteMeta>,
        /// Text documents served by `fetch_text`.
        pub texts: HashMap<String, String>,
        /// Body written by a transfer; `None` fails the transfer halfway.
        pub body: Option<Vec<u8>>,
        /// Turned into a directory during the transfer, so saving a state
        /// file there fails.
        pub state_blocker: Option<PathBuf>,
        pub cache_enabled: bool,
        pub cache: Mutex<HashMap<String, Vec<String>>>,
        pub probed: Mutex<Vec<String>>,
        pub downloads: Mutex<Vec<TransferStatus>>,
    }

    impl FakeFetcher {
        pub(crate) fn with_meta(mut self, url: &str, size: u64) -> Self {
            self.metas.insert(
                url.to_string(),
                RemoteMeta {
                    size,
                    modified_at: None,
                },
            );
            self
        }

        pub(crate) fn with_text(mut self, url: &str, text: &str) -> Self {
            self.texts.insert(url.to_string(), text.to_string());
            self
        }

        pub(crate) fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }

        pub(crate) fn downloads(&self) -> Vec<TransferStatus> {
            self.downloads.lock().unwrap().clone()
        }
    }

    impl MetadataProbe for FakeFetcher {
        fn head_info<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteMeta, ProbeError>> {
            Box::pin(async move {
                self.probed.lock().unwrap().push(url.to_string());
                self.metas.get(url).copied().ok_or(ProbeError::Status(503))
            })
        }
    }

    impl ArtifactFetcher for FakeFetcher {
        fn resumable_download<'a>(
            &'a self,
            url: &'a str,
            status: &'a mut TransferStatus,
            progress: Option<&'a mpsc::Sender<ProgressEvent>>,
            cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<(), DownloadError>> {
            Box::pin(async move {
                self.downloads.lock().unwrap().push(status.clone());
                if cancel.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }
                status.url = url.to_string();
                if let Some(path) = &self.state_blocker {
                    std::fs::remove_file(path)?;
                    std::fs::create_dir(path)?;
                }
                match &self.body {
                    Some(body) => {
                        std::fs::write(&status.target_file, body)?;
                        status.total_size = body.len() as u64;
                        status.transferred = body.len() as u64;
                        if let Some(tx) = progress {
                            let _ = tx.try_send(ProgressEvent::from_chunk(status, body.len() as u64, 1));
                        }
                        Ok(())
                    }
                    None => {
                        std::fs::write(&status.target_file, b"part")?;
                        status.transferred = 4;
                        Err(DownloadError::HttpStatus(502))
                    }
                }
            })
        }

        fn fetch_text<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, DownloadError>> {
            Box::pin(async move {
                self.texts
                    .get(url)
                    .cloned()
                    .ok_or(DownloadError::HttpStatus(404))
            })
        }

        fn remote_url_cache_enabled(&self) -> bool {
            self.cache_enabled
        }

        fn put_remote_url<'a>(
            &'a self,
            key: &'a str,
            url: &'a str,
        ) -> BoxFuture<'a, Result<(), DownloadError>> {
            Box::pin(async move {
                if !self.cache_enabled {
                    return Err(DownloadError::CacheDisabled);
                }
                let mut cache = self.cache.lock().unwrap();
                cache.entry(key.to_string()).or_default().push(url.to_string());
                Ok(())
            })
        }

        fn get_remote_urls<'a>(
            &'a self,
            key: &'a str,
        ) -> BoxFuture<'a, Result<Vec<String>, DownloadError>> {
            Box::pin(async move {
                if !self.cache_enabled {
                    return Err(DownloadError::CacheDisabled);
                }
                Ok(self.cache.lock().unwrap().get(key).cloned().unwrap_or_default())
            })
        }
    }
}
