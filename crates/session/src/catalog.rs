//! iStoreOS x86_64 EFI images and their mirrors.
//!
//! The current version of each release line is published in a
//! `version.index` file; the image is then mirrored under the same path on
//! several hosts.

use std::fmt;

use tracing::debug;

use crate::error::SessionError;
use crate::fetcher::ArtifactFetcher;

const MIRROR_HOSTS: [&str; 3] = [
    "https://fw.d4ctech.com",
    "https://dl.istoreos.com",
    "https://fw0.koolcenter.com",
];

const INDEX_HOST: &str = "https://fw0.koolcenter.com";

/// An iStoreOS release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IstoreRelease {
    /// The 24.10 line.
    Latest,
    /// The 22.03 line.
    Legacy,
}

impl IstoreRelease {
    /// Directory name of the release line on every mirror.
    pub fn channel(self) -> &'static str {
        match self {
            IstoreRelease::Latest => "iStoreOS",
            IstoreRelease::Legacy => "iStoreOS-22.03",
        }
    }

    /// Key under which working mirrors are remembered in the remote URL cache.
    pub fn cache_key(self) -> &'static str {
        match self {
            IstoreRelease::Latest => "istoreos",
            IstoreRelease::Legacy => "istoreos-22.03",
        }
    }

    /// Known-good image URLs, used when the version index is unreachable.
    pub fn default_urls(self) -> Vec<String> {
        let url = match self {
            IstoreRelease::Latest => {
                "https://dl.istoreos.com/iStoreOS/x86_64_efi/istoreos-24.10.1-2025052311-x86-64-squashfs-combined-efi.img.gz"
            }
            IstoreRelease::Legacy => {
                "https://dl.istoreos.com/iStoreOS-22.03/x86_64_efi/istoreos-22.03.7-2025051615-x86-64-squashfs-combined-efi.img.gz"
            }
        };
        vec![url.to_string()]
    }

    pub fn version_index_url(self) -> String {
        format!("{INDEX_HOST}/{}/x86_64_efi/version.index", self.channel())
    }

    /// Image URL for `version` on every mirror, in priority order.
    pub fn mirror_urls(self, version: &str) -> Vec<String> {
        MIRROR_HOSTS
            .iter()
            .map(|host| {
                format!(
                    "{host}/{}/x86_64_efi/istoreos-{version}-x86-64-squashfs-combined-efi.img.gz",
                    self.channel()
                )
            })
            .collect()
    }
}

impl fmt::Display for IstoreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

/// Reads the current version of `release` and returns its mirror URLs.
pub async fn resolve_urls<F>(fetcher: &F, release: IstoreRelease) -> Result<Vec<String>, SessionError>
where
    F: ArtifactFetcher + ?Sized,
{
    let index_url = release.version_index_url();
    let text = fetcher.fetch_text(&index_url).await?;
    let version = text.trim();
    if version.is_empty() {
        return Err(SessionError::EmptyVersionIndex(index_url));
    }
    debug!(%release, version, "resolved release version");
    Ok(release.mirror_urls(version))
}
