//! Fetch configuration.
//!
//! Read from `~/.config/fastpve/config.json`. Every field is optional; a
//! missing or unparseable file falls back to the defaults.

use std::path::{Path, PathBuf};

use fastpve_download::DownloaderConfig;
use serde::{Deserialize, Serialize};

/// Proxmox VE template cache, where images are staged before import.
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/vz/template/cache";

const STATE_FILE_NAME: &str = "fastpve_fetch.ops";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    state_file: Option<PathBuf>,
    #[serde(default)]
    progress_interval_secs: Option<u64>,
    #[serde(default)]
    downloader: DownloaderConfig,
}

/// Effective configuration after applying defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory receiving downloaded artifacts.
    pub cache_dir: PathBuf,

    /// State file holding the resumable record.
    pub state_file: PathBuf,

    /// Minimum seconds between two progress log lines.
    pub progress_interval_secs: u64,

    pub downloader: DownloaderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let cache_dir = PathBuf::from(DEFAULT_CACHE_DIR);
        Self {
            state_file: cache_dir.join(STATE_FILE_NAME),
            cache_dir,
            progress_interval_secs: 2,
            downloader: DownloaderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the user's configuration file, if any.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Self::from_file(file)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = Self::default();
        let cache_dir = file.cache_dir.unwrap_or(defaults.cache_dir);
        // The state file follows a custom cache directory unless set itself.
        let state_file = file
            .state_file
            .unwrap_or_else(|| cache_dir.join(STATE_FILE_NAME));
        Self {
            cache_dir,
            state_file,
            progress_interval_secs: file
                .progress_interval_secs
                .unwrap_or(defaults.progress_interval_secs),
            downloader: file.downloader,
        }
    }
}

fn config_path() -> PathBuf {
    config_base_dir().join("fastpve").join("config.json")
}

fn config_base_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
    PathBuf::from(home).join(".config")
}
