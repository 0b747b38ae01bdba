//! Persisted transfer state.
//!
//! One [`TransferStatus`] describes one in-flight artifact. The record is
//! written by the caller at session start and stop (never per chunk) and is
//! read back to decide whether a later run may resume.

use std::path::Path;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DownloadError;

/// State of a single transfer, keyed by its `(url, target_file)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    /// The chosen mirror URL.
    pub url: String,

    /// Absolute path of the file being written.
    pub target_file: String,

    /// Authoritative remote size in bytes (0 if unknown).
    #[serde(default)]
    pub total_size: u64,

    /// Bytes written so far; also the resume offset into `target_file`.
    #[serde(rename = "curr", default)]
    pub transferred: u64,

    /// Remote `Last-Modified` at the time size and offset were last validated.
    #[serde(
        rename = "mod_time",
        default,
        deserialize_with = "zero_time_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_modified_at: Option<DateTime<Utc>>,
}

impl TransferStatus {
    /// Creates a fresh record for `url` written to `target_file`.
    pub fn new(url: impl Into<String>, target_file: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target_file: target_file.into(),
            ..Default::default()
        }
    }

    /// Returns `true` if this record belongs to exactly this session.
    pub fn matches(&self, url: &str, target_file: &Path) -> bool {
        self.url == url && Path::new(&self.target_file) == target_file
    }

    /// Returns `true` once every byte of a known-size artifact is on disk.
    pub fn is_complete(&self) -> bool {
        self.total_size > 0 && self.transferred >= self.total_size
    }

    /// Completion in whole percent, `None` while the size is unknown.
    pub fn percent(&self) -> Option<u8> {
        if self.total_size == 0 {
            return None;
        }
        let pct = self.transferred.saturating_mul(100) / self.total_size;
        Some(pct.min(100) as u8)
    }

    /// Bytes still missing, 0 when the size is unknown.
    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.transferred)
    }
}

/// Older state files store "no timestamp" as the year-1 zero time.
fn zero_time_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|t| t.year() > 1))
}

/// Reads a status record. Absence of the file means "no resumable session".
pub async fn load(path: &Path) -> Result<Option<TransferStatus>, DownloadError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Writes a status record atomically (temp file, then rename).
pub async fn save(path: &Path, status: &TransferStatus) -> Result<(), DownloadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec(status)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::debug!(path = %path.display(), curr = status.transferred, "status saved");
    Ok(())
}

/// Deletes a status record; a missing file is not an error.
pub async fn remove(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
