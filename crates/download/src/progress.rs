//! Progress events emitted by the transfer engine.

use tokio::sync::mpsc;

use crate::status::TransferStatus;

/// Snapshot of a transfer after one copied chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Status as of the end of the chunk.
    pub status: TransferStatus,
    /// Throughput of the last chunk in bytes/second.
    pub bytes_per_second: u64,
    /// Whole-percent completion, `None` while the size is unknown.
    pub percent: Option<u8>,
}

impl ProgressEvent {
    /// Builds an event from the bytes of one chunk and the time it took.
    pub fn from_chunk(status: &TransferStatus, chunk_bytes: u64, elapsed_ms: u64) -> Self {
        Self {
            status: status.clone(),
            bytes_per_second: throughput(chunk_bytes, elapsed_ms),
            percent: status.percent(),
        }
    }
}

/// Bytes/second for `bytes` copied in `elapsed_ms` (the `+ 1` keeps a
/// sub-millisecond chunk from dividing by zero).
pub fn throughput(bytes: u64, elapsed_ms: u64) -> u64 {
    bytes.saturating_mul(1000) / elapsed_ms.saturating_add(1)
}

/// Hands `event` to the consumer without waiting.
///
/// A full queue or a departed consumer drops the event: progress reporting
/// never applies backpressure to the transfer.
pub(crate) fn publish(tx: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    let Some(tx) = tx else {
        return;
    };
    if let Err(e) = tx.try_send(event) {
        tracing::trace!("progress event dropped: {e}");
    }
}
