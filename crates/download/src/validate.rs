//! Resume validation.
//!
//! Any doubt collapses to a restart from offset 0: resuming onto the wrong
//! bytes corrupts the artifact, re-downloading only costs time.

use std::path::Path;

use tracing::{debug, warn};

use crate::probe::{MetadataProbe, RemoteMeta};
use crate::status::TransferStatus;

/// Outcome of checking a persisted record against the remote and local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Continue at `offset`.
    Resume { offset: u64 },
    /// Discard the partial file and start over.
    Restart(RestartReason),
}

impl ResumeDecision {
    pub fn is_resume(&self) -> bool {
        matches!(self, ResumeDecision::Resume { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The record was written for another URL.
    DifferentSource,
    /// The URL could not be re-probed.
    ProbeFailed,
    /// Remote size or modification time changed.
    RemoteChanged,
    /// The partial file is gone.
    LocalMissing,
    /// The partial file is shorter than the recorded offset.
    LocalShorter,
}

/// Decides whether `status` may resume against `url`.
///
/// On a restart caused by another URL or a remote change, the record's size
/// and modification time are updated to the fresh values, so the restarted
/// transfer is tracked against the new artifact.
pub async fn check_resume<P>(probe: &P, url: &str, status: &mut TransferStatus) -> ResumeDecision
where
    P: MetadataProbe + ?Sized,
{
    if status.url != url {
        debug!(old = %status.url, new = url, "status belongs to another URL");
        status.url = url.to_string();
        match probe.head_info(url).await {
            Ok(remote) => {
                status.total_size = remote.size;
                status.remote_modified_at = remote.modified_at;
            }
            Err(e) => {
                warn!(url, error = %e, "probe of new URL failed, size unknown");
                status.total_size = 0;
                status.remote_modified_at = None;
            }
        }
        return ResumeDecision::Restart(RestartReason::DifferentSource);
    }

    let remote = match probe.head_info(url).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!(url, error = %e, "re-probe failed, restarting download");
            return ResumeDecision::Restart(RestartReason::ProbeFailed);
        }
    };

    if status.total_size != remote.size || status.remote_modified_at != remote.modified_at {
        debug!(
            url,
            old_size = status.total_size,
            new_size = remote.size,
            "remote artifact changed"
        );
        status.total_size = remote.size;
        status.remote_modified_at = remote.modified_at;
        return ResumeDecision::Restart(RestartReason::RemoteChanged);
    }

    if status.transferred > 0 {
        match tokio::fs::metadata(&status.target_file).await {
            Err(_) => return ResumeDecision::Restart(RestartReason::LocalMissing),
            Ok(meta) if meta.len() < status.transferred => {
                return ResumeDecision::Restart(RestartReason::LocalShorter);
            }
            Ok(_) => {}
        }
    }

    ResumeDecision::Resume {
        offset: status.transferred,
    }
}

/// Checks a record against already-known remote metadata, without probing.
///
/// A complete record is accepted regardless of remote metadata; an
/// incomplete one must match it exactly. A non-zero offset must be backed by
/// a local file at least that long.
pub fn verify_status(status: &TransferStatus, remote: &RemoteMeta) -> bool {
    if !status.is_complete()
        && (status.total_size != remote.size || status.remote_modified_at != remote.modified_at)
    {
        return false;
    }
    if status.transferred > 0 {
        match std::fs::metadata(Path::new(&status.target_file)) {
            Ok(meta) => meta.len() >= status.transferred,
            Err(_) => false,
        }
    } else {
        true
    }
}
