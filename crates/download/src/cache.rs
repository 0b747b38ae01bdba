//! Optional remote URL cache.
//!
//! Some deployments share known-good mirror URLs through an external service.
//! The engine only sees the [`RemoteUrlCache`] capability; without a real
//! implementation it behaves exactly like [`NoopRemoteUrlCache`].

use futures_util::future::BoxFuture;

use crate::error::DownloadError;

/// A key/value store mapping an artifact key to known mirror URLs.
pub trait RemoteUrlCache: Send + Sync {
    /// Records `url` as a working mirror for `key`.
    fn put<'a>(&'a self, key: &'a str, url: &'a str) -> BoxFuture<'a, Result<(), DownloadError>>;

    /// Returns the mirrors known for `key`, best first.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>, DownloadError>>;
}

/// The default cache: every call fails with [`DownloadError::CacheDisabled`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRemoteUrlCache;

impl RemoteUrlCache for NoopRemoteUrlCache {
    fn put<'a>(&'a self, _key: &'a str, _url: &'a str) -> BoxFuture<'a, Result<(), DownloadError>> {
        Box::pin(async { Err(DownloadError::CacheDisabled) })
    }

    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Vec<String>, DownloadError>> {
        Box::pin(async { Err(DownloadError::CacheDisabled) })
    }
}
