//! Session error types.

use std::path::PathBuf;

use fastpve_download::{DownloadError, ProbeError};

/// Errors produced while driving a download session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("no saved session at {}", .0.display())]
    NoSession(PathBuf),

    #[error("saved session for {0} no longer matches the remote artifact")]
    StaleSession(String),

    #[error("version index {0} is empty")]
    EmptyVersionIndex(String),
}

impl SessionError {
    /// Returns `true` if the session was stopped by its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Download(DownloadError::Cancelled))
    }

    /// Returns `true` when running the same session again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Download(e) => e.is_transient(),
            SessionError::Probe(e) => e.is_transient(),
            _ => false,
        }
    }
}
