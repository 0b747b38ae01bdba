//! Transfer engine.
//!
//! Streams the body of a (possibly ranged) GET into the target file chunk by
//! chunk. Chunk size follows observed throughput, every chunk feeds the stall
//! watchdog and publishes a progress event, and the caller's
//! [`TransferStatus`] is updated in place so it can be persisted whatever the
//! outcome.

use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::TryStreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Downloader;
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::progress::{self, ProgressEvent};
use crate::status::TransferStatus;
use crate::validate::check_resume;

const COPY_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Throughput-driven chunk size.
///
/// A chunk finishing under the slow threshold doubles the next one (up to the
/// ceiling); a slower chunk halves it (down to the floor).
#[derive(Debug, Clone)]
pub struct AdaptiveChunk {
    current: u64,
    floor: u64,
    ceiling: u64,
    slow: Duration,
}

impl AdaptiveChunk {
    pub fn new(floor: u64, ceiling: u64, slow: Duration) -> Self {
        let floor = floor.max(1);
        Self {
            current: floor,
            floor,
            ceiling: ceiling.max(floor),
            slow,
        }
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self::new(config.chunk_floor, config.chunk_ceiling, config.slow_chunk_threshold)
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    /// Feeds the duration of the last chunk and returns the next size.
    pub fn adjust(&mut self, elapsed: Duration) -> u64 {
        self.current = if elapsed < self.slow {
            self.current.saturating_mul(2).min(self.ceiling)
        } else {
            (self.current / 2).max(self.floor)
        };
        self.current
    }
}

impl Downloader {
    /// Downloads `url` into `status.target_file`, resuming when the record
    /// still describes the remote artifact and the partial file.
    ///
    /// `status` is updated after every chunk; on error it describes exactly
    /// what is on disk, so saving it allows a later resume. A record that is
    /// already complete returns without any request.
    pub async fn resumable_download(
        &self,
        url: &str,
        status: &mut TransferStatus,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        if status.target_file.is_empty() {
            return Err(DownloadError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty target path",
            )));
        }

        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            decision = check_resume(self, url, status) => decision,
        };
        if !decision.is_resume() {
            info!(url, reason = ?decision, "starting download from zero");
            status.transferred = 0;
        }

        let mut file = open_target(Path::new(&status.target_file), status.transferred).await?;

        if decision.is_resume() && status.is_complete() {
            info!(url, size = status.total_size, "already complete");
            return Ok(());
        }

        let mut request = self.client.get(url);
        if status.transferred > 0 {
            request = request.header(RANGE, format!("bytes={}-", status.transferred));
        }
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = request.send() => response?,
        };

        let code = response.status();
        if code.is_client_error() || code.is_server_error() {
            return Err(DownloadError::HttpStatus(code.as_u16()));
        }
        if status.transferred > 0 && code != StatusCode::PARTIAL_CONTENT {
            warn!(url, status = code.as_u16(), "range not honored, restarting from zero");
            status.transferred = 0;
            file.set_len(0).await?;
            file.seek(SeekFrom::Start(0)).await?;
        }

        info!(
            url,
            offset = status.transferred,
            total = status.total_size,
            "transfer started"
        );

        let body = StreamReader::new(Box::pin(response.bytes_stream().map_err(io::Error::other)));
        let copied = self.copy_body(body, &mut file, status, progress, cancel).await;
        let flushed = file.flush().await;
        copied?;
        flushed?;

        info!(url, bytes = status.transferred, "transfer complete");
        Ok(())
    }

    /// Copies `body` chunk by chunk until EOF, a stall, or cancellation.
    async fn copy_body<R>(
        &self,
        mut body: R,
        file: &mut File,
        status: &mut TransferStatus,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError>
    where
        R: AsyncRead + Unpin,
    {
        let stall_timeout = self.config.stall_timeout;
        let (chunk_done_tx, chunk_done_rx) = mpsc::channel(1);
        let mut copier = ChunkCopier {
            buf: vec![0u8; COPY_BUFFER_SIZE],
            close_body: CancellationToken::new(),
            cancel: cancel.clone(),
            stall_timeout,
        };
        let watchdog = tokio::spawn(stall_watchdog(
            stall_timeout,
            chunk_done_rx,
            copier.close_body.clone(),
        ));

        let mut sizer = AdaptiveChunk::from_config(&self.config);
        let result = loop {
            let started = Instant::now();
            let (n, copied) = copier.copy(&mut body, file, sizer.current()).await;
            let elapsed = started.elapsed();

            status.transferred += n;
            let _ = chunk_done_tx.try_send(());
            let next = sizer.adjust(elapsed);
            debug!(bytes = n, elapsed_ms = elapsed.as_millis() as u64, next, "chunk done");
            progress::publish(
                progress,
                ProgressEvent::from_chunk(status, n, elapsed.as_millis() as u64),
            );

            match copied {
                Err(e) => break Err(e),
                Ok(()) if n == 0 => break Ok(()),
                Ok(()) => {}
            }
        };

        drop(chunk_done_tx);
        let _ = watchdog.await;
        result
    }
}

/// Opens the target for writing at `offset`, dropping anything past it.
async fn open_target(path: &Path, offset: u64) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?;
    file.set_len(offset).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}

struct ChunkCopier {
    buf: Vec<u8>,
    close_body: CancellationToken,
    cancel: CancellationToken,
    stall_timeout: Duration,
}

impl ChunkCopier {
    /// Copies at most `limit` bytes. Returns the bytes written even when the
    /// copy fails part-way.
    async fn copy<R>(&mut self, reader: &mut R, file: &mut File, limit: u64) -> (u64, Result<(), DownloadError>)
    where
        R: AsyncRead + Unpin,
    {
        let mut written = 0u64;
        while written < limit {
            let want = (limit - written).min(self.buf.len() as u64) as usize;
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return (written, Err(DownloadError::Cancelled)),
                _ = self.close_body.cancelled() => {
                    return (written, Err(DownloadError::StallTimeout(self.stall_timeout)));
                }
                read = reader.read(&mut self.buf[..want]) => read,
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => return (written, Err(e.into())),
            };
            if let Err(e) = file.write_all(&self.buf[..n]).await {
                return (written, Err(e.into()));
            }
            written += n as u64;
        }
        (written, Ok(()))
    }
}

/// Closes the body when no chunk completes within `timeout`.
///
/// Each message on `chunk_done` re-arms the timer; the channel closing means
/// the transfer ended on its own.
async fn stall_watchdog(
    timeout: Duration,
    mut chunk_done: mpsc::Receiver<()>,
    close_body: CancellationToken,
) {
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            msg = chunk_done.recv() => match msg {
                Some(()) => sleep.as_mut().reset(tokio::time::Instant::now() + timeout),
                None => return,
            },
            _ = &mut sleep => {
                warn!(timeout_secs = timeout.as_secs(), "no chunk completed in time, closing body");
                close_body.cancel();
                return;
            }
        }
    }
}
