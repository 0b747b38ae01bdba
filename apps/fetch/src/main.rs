mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fastpve_download::Downloader;
use fastpve_session::{
    ArtifactSource, FetchRequest, IstoreRelease, ProgressReporter, SessionError, fetch_artifact,
    restore_session,
};

use config::AppConfig;

/// Resumable, mirror-aware downloads of OS images.
///
/// Interrupted downloads leave a state file behind; rerun with `--resume`
/// to continue where the transfer stopped.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Candidate URLs of the same artifact, in priority order.
    urls: Vec<String>,

    /// Directory receiving the artifact.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// State file used to resume an interrupted download.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Download the current iStoreOS image of a release line.
    #[arg(long, value_enum, conflicts_with = "urls")]
    istore: Option<Release>,

    /// Continue the download recorded in the state file.
    #[arg(long, conflicts_with_all = ["urls", "istore"])]
    resume: bool,

    /// Remote URL cache key for the candidate URLs.
    #[arg(long, requires = "urls")]
    cache_key: Option<String>,

    /// Delete the state file once the artifact is complete. Without it the
    /// completed record stays, and rerunning the same fetch is a no-op.
    #[arg(long)]
    discard_state: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Release {
    /// iStoreOS 24.10.
    Latest,
    /// iStoreOS 22.03.
    Legacy,
}

impl From<Release> for IstoreRelease {
    fn from(release: Release) -> Self {
        match release {
            Release::Latest => IstoreRelease::Latest,
            Release::Legacy => IstoreRelease::Legacy,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load()?;

    let cache_dir = args.dir.clone().unwrap_or_else(|| config.cache_dir.clone());
    let state_path = args.state.clone().unwrap_or_else(|| config.state_file.clone());

    let downloader =
        Downloader::with_config(config.downloader.clone()).context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping download");
            on_signal.cancel();
        }
    });

    let source = if args.resume {
        let saved = restore_session(&downloader, &state_path)
            .await
            .context("cannot resume")?;
        ArtifactSource::Resume(saved)
    } else if let Some(release) = args.istore {
        ArtifactSource::Istore(release.into())
    } else if !args.urls.is_empty() {
        ArtifactSource::Candidates {
            cache_key: args.cache_key,
            urls: args.urls,
        }
    } else {
        anyhow::bail!("nothing to download: pass URLs, --istore or --resume");
    };

    let request = FetchRequest {
        cache_dir,
        state_path: state_path.clone(),
        source,
        reporter: ProgressReporter::new(
            Duration::from_secs(config.progress_interval_secs),
            config.downloader.progress_capacity,
        ),
    };

    match fetch_artifact(&downloader, request, &cancel).await {
        Ok(path) => {
            if args.discard_state
                && let Err(e) = fastpve_download::status::remove(&state_path).await
            {
                tracing::warn!(path = %state_path.display(), error = %e, "could not discard finished session");
            }
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => Err(failure_hint(e, &state_path)),
    }
}

/// Adds the `--resume` hint to failures that a later run may get past.
fn failure_hint(err: SessionError, state_path: &Path) -> anyhow::Error {
    if err.is_cancelled() {
        anyhow::anyhow!(
            "download cancelled; run again with --resume (state in {})",
            state_path.display()
        )
    } else if err.is_transient() {
        anyhow::Error::new(err).context(format!(
            "download failed; retry with --resume (state in {})",
            state_path.display()
        ))
    } else {
        anyhow::Error::new(err).context("download failed")
    }
}
