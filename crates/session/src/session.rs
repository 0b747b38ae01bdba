//! Download sessions: choosing a source, persisting the record, running the
//! transfer.

use std::path::{Path, PathBuf};

use fastpve_download::status as state_file;
use fastpve_download::{SelectedMirror, TransferStatus};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{self, IstoreRelease};
use crate::error::SessionError;
use crate::fetcher::ArtifactFetcher;
use crate::reporter::ProgressReporter;

/// File name used when a URL has no usable last path segment.
pub const FALLBACK_FILE_NAME: &str = "download.bin";

/// Where a session gets its artifact from.
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// Continue a record restored with [`restore_session`].
    Resume(TransferStatus),
    /// Explicit candidate URLs in priority order. With a cache key, mirrors
    /// remembered in the remote URL cache are tried first.
    Candidates {
        cache_key: Option<String>,
        urls: Vec<String>,
    },
    /// The current image of an iStoreOS release line.
    Istore(IstoreRelease),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Directory receiving the artifact.
    pub cache_dir: PathBuf,
    /// State file holding the resumable record.
    pub state_path: PathBuf,
    pub source: ArtifactSource,
    pub reporter: ProgressReporter,
}

/// Picks the first candidate that answers a metadata probe.
pub async fn select_first_reachable<F, S>(fetcher: &F, urls: &[S]) -> Result<SelectedMirror, SessionError>
where
    F: ArtifactFetcher + ?Sized,
    S: AsRef<str>,
{
    Ok(fastpve_download::select_first_reachable(fetcher, urls).await?)
}

/// Loads the record at `state_path` and accepts it only if it still
/// describes the remote artifact and the partial file on disk.
pub async fn restore_session<F>(fetcher: &F, state_path: &Path) -> Result<TransferStatus, SessionError>
where
    F: ArtifactFetcher + ?Sized,
{
    let saved = state_file::load(state_path)
        .await?
        .ok_or_else(|| SessionError::NoSession(state_path.to_path_buf()))?;

    let remote = fetcher.head_info(&saved.url).await?;
    if !fetcher.verify_status(&saved, &remote) {
        return Err(SessionError::StaleSession(saved.url));
    }

    info!(
        url = %saved.url,
        transferred = saved.transferred,
        total = saved.total_size,
        "restored download session"
    );
    Ok(saved)
}

/// Runs one transfer for `status`, keeping the state file in step.
///
/// The record is saved before the transfer starts and again once it ends,
/// whatever the outcome: an interrupted session can be restored, and a
/// completed one makes the next run a no-op. A transfer error takes
/// precedence over a failed final save; after a successful transfer the
/// save error is returned. Returns the path of the finished file.
pub async fn download_file<F>(
    fetcher: &F,
    state_path: &Path,
    status: &mut TransferStatus,
    cancel: &CancellationToken,
    reporter: ProgressReporter,
) -> Result<PathBuf, SessionError>
where
    F: ArtifactFetcher + ?Sized,
{
    state_file::save(state_path, status).await?;

    let (tx, rx) = mpsc::channel(reporter.capacity.max(1));
    let reporting = tokio::spawn(reporter.run(rx));

    let url = status.url.clone();
    let result = fetcher.resumable_download(&url, status, Some(&tx), cancel).await;

    drop(tx);
    let _ = reporting.await;

    let saved = state_file::save(state_path, status).await;
    match (result, saved) {
        (Err(e), Err(save_err)) => {
            warn!(path = %state_path.display(), error = %save_err, "failed to save download state");
            return Err(e.into());
        }
        (Err(e), Ok(())) => return Err(e.into()),
        (Ok(()), saved) => saved?,
    }
    info!(url = %url, file = %status.target_file, bytes = status.transferred, "download finished");
    Ok(PathBuf::from(&status.target_file))
}

/// Resolves the request's source to a record and downloads it into
/// `cache_dir`.
pub async fn fetch_artifact<F>(
    fetcher: &F,
    request: FetchRequest,
    cancel: &CancellationToken,
) -> Result<PathBuf, SessionError>
where
    F: ArtifactFetcher + ?Sized,
{
    let FetchRequest {
        cache_dir,
        state_path,
        source,
        reporter,
    } = request;

    let (cache_key, candidates) = match source {
        ArtifactSource::Resume(mut saved) => {
            return download_file(fetcher, &state_path, &mut saved, cancel, reporter).await;
        }
        ArtifactSource::Candidates { cache_key, urls } => (cache_key, urls),
        ArtifactSource::Istore(release) => {
            let mut urls = match catalog::resolve_urls(fetcher, release).await {
                Ok(urls) => urls,
                Err(e) => {
                    warn!(%release, error = %e, "version index unavailable, using default URLs");
                    Vec::new()
                }
            };
            urls.extend(release.default_urls());
            (Some(release.cache_key().to_string()), urls)
        }
    };

    let mut ordered = match &cache_key {
        Some(key) => cached_urls(fetcher, key).await,
        None => Vec::new(),
    };
    ordered.extend(candidates);
    dedup_in_order(&mut ordered);

    let selected = select_first_reachable(fetcher, &ordered).await?;

    if let Some(key) = &cache_key
        && fetcher.remote_url_cache_enabled()
        && let Err(e) = fetcher.put_remote_url(key, &selected.url).await
    {
        debug!(key, error = %e, "could not remember mirror");
    }

    let target = cache_dir.join(file_name_from_url(&selected.url));
    let mut record = match state_file::load(&state_path).await {
        Ok(Some(saved))
            if saved.matches(&selected.url, &target)
                && fetcher.verify_status(&saved, &selected.meta) =>
        {
            info!(url = %saved.url, transferred = saved.transferred, "continuing saved session");
            saved
        }
        _ => TransferStatus {
            url: selected.url.clone(),
            target_file: target.to_string_lossy().into_owned(),
            total_size: selected.meta.size,
            transferred: 0,
            remote_modified_at: selected.meta.modified_at,
        },
    };

    download_file(fetcher, &state_path, &mut record, cancel, reporter).await
}

/// Mirrors remembered for `key`; an unavailable cache yields none.
async fn cached_urls<F>(fetcher: &F, key: &str) -> Vec<String>
where
    F: ArtifactFetcher + ?Sized,
{
    if !fetcher.remote_url_cache_enabled() {
        return Vec::new();
    }
    match fetcher.get_remote_urls(key).await {
        Ok(urls) => urls,
        Err(e) => {
            debug!(key, error = %e, "remote URL cache lookup failed");
            Vec::new()
        }
    }
}

fn dedup_in_order(urls: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
}

/// Last non-empty path segment of `url`, or [`FALLBACK_FILE_NAME`].
pub fn file_name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
