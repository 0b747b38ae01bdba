//! Rate-limited progress logging.

use std::time::{Duration, Instant};

use fastpve_download::ProgressEvent;
use tokio::sync::mpsc;
use tracing::info;

/// Drains a transfer's progress queue and logs at most once per interval.
///
/// The final 100% event is always logged.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    pub interval: Duration,
    /// Depth of the bounded queue between the engine and the reporter.
    pub capacity: usize,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            capacity: fastpve_download::config::DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

impl ProgressReporter {
    pub fn new(interval: Duration, capacity: usize) -> Self {
        Self {
            interval,
            capacity: capacity.max(1),
        }
    }

    /// Consumes events until the sender side is dropped; returns the last one.
    pub async fn run(self, mut rx: mpsc::Receiver<ProgressEvent>) -> Option<ProgressEvent> {
        let mut last_logged: Option<Instant> = None;
        let mut last = None;

        while let Some(event) = rx.recv().await {
            let due = last_logged.is_none_or(|at| at.elapsed() >= self.interval);
            if due || event.percent == Some(100) {
                log_event(&event);
                last_logged = Some(Instant::now());
            }
            last = Some(event);
        }
        last
    }
}

fn log_event(event: &ProgressEvent) {
    let status = &event.status;
    match event.percent {
        Some(percent) => info!(
            url = %status.url,
            percent,
            transferred = status.transferred,
            total = status.total_size,
            remaining = status.remaining(),
            speed = %human_rate(event.bytes_per_second),
            "downloading"
        ),
        None => info!(
            url = %status.url,
            transferred = status.transferred,
            speed = %human_rate(event.bytes_per_second),
            "downloading (size unknown)"
        ),
    }
}

/// Formats a byte rate with binary units, e.g. `12.5 MiB/s`.
pub fn human_rate(bytes_per_second: u64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_second as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes_per_second} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpve_download::TransferStatus;

    fn event(transferred: u64) -> ProgressEvent {
        let status = TransferStatus {
            total_size: 100,
            transferred,
            ..Default::default()
        };
        ProgressEvent::from_chunk(&status, 10, 10)
    }

    #[test]
    fn rates_use_binary_units() {
        assert_eq!(human_rate(512), "512 B/s");
        assert_eq!(human_rate(1536), "1.5 KiB/s");
        assert_eq!(human_rate(12 * 1024 * 1024 + 512 * 1024), "12.5 MiB/s");
    }

    #[tokio::test]
    async fn run_returns_last_event_after_sender_drops() {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(ProgressReporter::new(Duration::from_secs(60), 8).run(rx));
        for transferred in [10, 50, 100] {
            tx.send(event(transferred)).await.unwrap();
        }
        drop(tx);

        let last = handle.await.unwrap().unwrap();
        assert_eq!(last.status.transferred, 100);
        assert_eq!(last.percent, Some(100));
    }

    #[tokio::test]
    async fn run_without_events_returns_none() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        assert!(ProgressReporter::default().run(rx).await.is_none());
    }
}
