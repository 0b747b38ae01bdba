//! Downloader tunables.
//!
//! Every field has a default matching the engine's documented behavior, so an
//! empty JSON object deserializes to [`DownloaderConfig::default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadline for each metadata request (HEAD and the manual-redirect GET).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reported sizes at or below this are treated as placeholder pages.
pub const DEFAULT_MIN_PLAUSIBLE_SIZE: u64 = 4096;

/// Maximum number of hops followed by the metadata probe.
pub const DEFAULT_MAX_REDIRECT_HOPS: usize = 5;

/// Smallest read chunk: 8 MiB.
pub const DEFAULT_CHUNK_FLOOR: u64 = 8 * 1024 * 1024;

/// Largest read chunk: 256 MiB.
pub const DEFAULT_CHUNK_CEILING: u64 = 256 * 1024 * 1024;

/// A chunk slower than this halves the next chunk; faster doubles it.
pub const DEFAULT_SLOW_CHUNK_THRESHOLD: Duration = Duration::from_secs(5);

/// No completed chunk within this window closes the response body.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Suggested depth of the progress queue handed to the engine.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 16;

/// Configuration for a [`Downloader`](crate::Downloader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,

    pub min_plausible_size: u64,

    pub max_redirect_hops: usize,

    pub chunk_floor: u64,

    pub chunk_ceiling: u64,

    #[serde(rename = "slow_chunk_threshold_ms", with = "millis")]
    pub slow_chunk_threshold: Duration,

    #[serde(rename = "stall_timeout_ms", with = "millis")]
    pub stall_timeout: Duration,

    pub progress_capacity: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            min_plausible_size: DEFAULT_MIN_PLAUSIBLE_SIZE,
            max_redirect_hops: DEFAULT_MAX_REDIRECT_HOPS,
            chunk_floor: DEFAULT_CHUNK_FLOOR,
            chunk_ceiling: DEFAULT_CHUNK_CEILING,
            slow_chunk_threshold: DEFAULT_SLOW_CHUNK_THRESHOLD,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

impl DownloaderConfig {
    /// Clamps values that would make the engine misbehave.
    ///
    /// - chunk floor is at least one byte, ceiling never below the floor
    /// - at least one probe hop and one queued progress event
    /// - zero timeouts fall back to their defaults
    pub fn normalized(mut self) -> Self {
        self.chunk_floor = self.chunk_floor.max(1);
        self.chunk_ceiling = self.chunk_ceiling.max(self.chunk_floor);
        self.max_redirect_hops = self.max_redirect_hops.max(1);
        self.progress_capacity = self.progress_capacity.max(1);
        if self.probe_timeout.is_zero() {
            self.probe_timeout = DEFAULT_PROBE_TIMEOUT;
        }
        if self.stall_timeout.is_zero() {
            self.stall_timeout = DEFAULT_STALL_TIMEOUT;
        }
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let cfg = DownloaderConfig::default();
        assert_eq!(cfg.probe_timeout, Duration::from_secs(10));
        assert_eq!(cfg.min_plausible_size, 4096);
        assert_eq!(cfg.max_redirect_hops, 5);
        assert_eq!(cfg.chunk_floor, 8 * 1024 * 1024);
        assert_eq!(cfg.chunk_ceiling, 256 * 1024 * 1024);
        assert_eq!(cfg.stall_timeout, Duration::from_secs(60));
    }

    #[test]
    fn empty_json_yields_defaults() {
        let cfg: DownloaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, DownloaderConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let cfg: DownloaderConfig =
            serde_json::from_str(r#"{"stall_timeout_ms":1500,"chunk_floor":1024}"#).unwrap();
        assert_eq!(cfg.stall_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.chunk_floor, 1024);
        assert_eq!(cfg.chunk_ceiling, DEFAULT_CHUNK_CEILING);
    }

    #[test]
    fn normalized_clamps_bounds() {
        let cfg = DownloaderConfig {
            chunk_floor: 0,
            chunk_ceiling: 0,
            max_redirect_hops: 0,
            progress_capacity: 0,
            stall_timeout: Duration::ZERO,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.chunk_floor, 1);
        assert_eq!(cfg.chunk_ceiling, 1);
        assert_eq!(cfg.max_redirect_hops, 1);
        assert_eq!(cfg.progress_capacity, 1);
        assert_eq!(cfg.stall_timeout, DEFAULT_STALL_TIMEOUT);
    }

    #[test]
    fn ceiling_below_floor_is_raised() {
        let cfg = DownloaderConfig {
            chunk_floor: 4096,
            chunk_ceiling: 1024,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.chunk_ceiling, 4096);
    }
}
