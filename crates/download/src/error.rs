//! Error types for the download engine.

use std::time::Duration;

/// Errors produced while resolving a URL's metadata.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("metadata request failed with status {0}")]
    Status(u16),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("redirect loop detected at {0}")]
    LoopDetected(String),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("metadata request timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else {
            ProbeError::Http(err)
        }
    }
}

/// Errors produced by mirror selection and the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("no reachable mirror among {tried} candidates, last error: {last}")]
    NoReachableMirror {
        tried: usize,
        #[source]
        last: Box<ProbeError>,
    },

    #[error("no candidate URLs given")]
    EmptyCandidates,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    #[error("download stalled: no progress for {}s", .0.as_secs())]
    StallTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("remote URL cache is disabled")]
    CacheDisabled,

    #[error("remote URL cache error: {0}")]
    Cache(String),
}

impl ProbeError {
    /// Network-level failures; a mirror answering with an error is not one.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Http(_) | ProbeError::Timeout)
    }
}

impl DownloadError {
    /// Returns `true` when a later attempt may succeed without any change on
    /// the caller's side (network trouble, stalls, server-side errors).
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Probe(e) => e.is_transient(),
            DownloadError::NoReachableMirror { .. }
            | DownloadError::Http(_)
            | DownloadError::StallTimeout(_) => true,
            DownloadError::HttpStatus(code) => *code >= 500,
            _ => false,
        }
    }
}
