//! Metadata probe: size and modification time of a remote artifact.
//!
//! Some mirrors answer a HEAD request with a tiny placeholder page instead of
//! a real redirect. A reported size at or below the plausibility threshold
//! therefore triggers a non-following GET to look for a `Location`, and the
//! probe restarts on the target. Visited URLs are tracked to catch loops.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use reqwest::Url;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, LAST_MODIFIED, LOCATION};
use tracing::debug;

use crate::Downloader;
use crate::error::ProbeError;

/// Authoritative metadata of a remote artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteMeta {
    /// Size in bytes, 0 when the server did not report one.
    pub size: u64,
    /// `Last-Modified`, when present and parseable.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Anything able to resolve a URL to [`RemoteMeta`].
pub trait MetadataProbe: Send + Sync {
    fn head_info<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteMeta, ProbeError>>;
}

impl MetadataProbe for Downloader {
    fn head_info<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteMeta, ProbeError>> {
        Box::pin(self.probe(url))
    }
}

impl Downloader {
    /// Resolves `url` to its size and modification time.
    ///
    /// Every request carries the configured probe timeout, so a dead mirror
    /// costs at most two deadlines per hop.
    pub async fn probe(&self, url: &str) -> Result<RemoteMeta, ProbeError> {
        let mut current = parse_url(url)?;
        let mut visited = vec![current.to_string()];

        for _ in 0..self.config.max_redirect_hops {
            let meta = self.head_meta(&current).await?;
            if meta.size > self.config.min_plausible_size {
                return Ok(meta);
            }

            let next = match self.real_location(&current).await {
                Ok(Some(next)) => next,
                Ok(None) => {
                    debug!(url = %current, size = meta.size, "no manual redirect, keeping reported size");
                    return Ok(meta);
                }
                Err(e) => {
                    debug!(url = %current, error = %e, "manual redirect lookup failed, keeping reported size");
                    return Ok(meta);
                }
            };

            let next_str = next.to_string();
            if visited.contains(&next_str) {
                return Err(ProbeError::LoopDetected(next_str));
            }
            debug!(from = %current, to = %next, "following manual redirect");
            visited.push(next_str);
            current = next;
        }

        Err(ProbeError::TooManyRedirects(self.config.max_redirect_hops))
    }

    /// HEAD request through the redirect-following client.
    async fn head_meta(&self, url: &Url) -> Result<RemoteMeta, ProbeError> {
        let resp = self
            .client
            .head(url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        Ok(meta_from_headers(resp.headers()))
    }

    /// GET without following redirects; returns the resolved `Location` of a
    /// 3xx answer.
    async fn real_location(&self, url: &Url) -> Result<Option<Url>, ProbeError> {
        let resp = self.no_redirect.get(url.clone()).send().await?;
        if !resp.status().is_redirection() {
            return Ok(None);
        }
        let Some(location) = resp.headers().get(LOCATION) else {
            return Ok(None);
        };
        let location = location
            .to_str()
            .map_err(|_| ProbeError::InvalidUrl("non-ASCII Location header".into()))?;
        url.join(location)
            .map(Some)
            .map_err(|e| ProbeError::InvalidUrl(format!("{location}: {e}")))
    }
}

fn parse_url(url: &str) -> Result<Url, ProbeError> {
    Url::parse(url).map_err(|e| ProbeError::InvalidUrl(format!("{url}: {e}")))
}

/// Reads size and modification time from response headers.
///
/// The size comes from the `Content-Length` header itself: a HEAD response
/// has no body to measure.
pub(crate) fn meta_from_headers(headers: &HeaderMap) -> RemoteMeta {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let modified_at = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    RemoteMeta { size, modified_at }
}

/// Parses an RFC 1123 HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
