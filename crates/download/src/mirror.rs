//! Mirror selection: first reachable candidate wins.

use tracing::{info, warn};

use crate::error::DownloadError;
use crate::probe::{MetadataProbe, RemoteMeta};

/// The mirror chosen for a transfer, with its freshly probed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMirror {
    pub url: String,
    pub meta: RemoteMeta,
}

/// Probes `urls` in order and returns the first that answers.
///
/// Order is a priority hint and is preserved; candidates after the first
/// success are never probed. If every candidate fails, the error carries the
/// last probe failure.
pub async fn select_first_reachable<P, S>(probe: &P, urls: &[S]) -> Result<SelectedMirror, DownloadError>
where
    P: MetadataProbe + ?Sized,
    S: AsRef<str>,
{
    let mut last = None;
    for url in urls {
        let url = url.as_ref();
        match probe.head_info(url).await {
            Ok(meta) => {
                info!(url, size = meta.size, "selected mirror");
                return Ok(SelectedMirror {
                    url: url.to_string(),
                    meta,
                });
            }
            Err(e) => {
                warn!(url, error = %e, "mirror unreachable");
                last = Some(e);
            }
        }
    }

    match last {
        Some(last) => Err(DownloadError::NoReachableMirror {
            tried: urls.len(),
            last: Box::new(last),
        }),
        None => Err(DownloadError::EmptyCandidates),
    }
}
