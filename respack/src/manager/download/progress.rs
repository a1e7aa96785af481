//! Transfer progress snapshots and rate limiting.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Progress of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Completion percentage, 0 while the total is unknown.
    pub percent: u8,
    /// Bytes written so far.
    pub downloaded_bytes: u64,
    /// Expected size, when the server announced one.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Build a snapshot, deriving the percentage from the byte counters.
    pub fn new(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        let percent = match total_bytes {
            Some(total) if total > 0 => {
                ((downloaded_bytes.min(total) as f64 / total as f64) * 100.0).floor() as u8
            }
            _ => 0,
        };
        Self {
            percent,
            downloaded_bytes,
            total_bytes,
        }
    }

    /// Final snapshot for a finished transfer.
    pub fn finished(bytes: u64) -> Self {
        Self {
            percent: 100,
            downloaded_bytes: bytes,
            total_bytes: Some(bytes),
        }
    }
}

/// Coalesces progress updates to a bounded rate.
///
/// An update passes when the interval since the last emitted update has
/// elapsed and the counters moved. The first update always passes.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last: Option<DownloadProgress>,
}

impl ProgressThrottle {
    /// Create a throttle emitting at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last: None,
        }
    }

    /// Decide whether `progress` should be reported now.
    pub fn should_emit(&mut self, progress: DownloadProgress) -> bool {
        self.should_emit_at(progress, Instant::now())
    }

    fn should_emit_at(&mut self, progress: DownloadProgress, now: Instant) -> bool {
        if self.last == Some(progress) {
            return false;
        }
        if let Some(at) = self.last_emit {
            if now.duration_since(at) < self.interval {
                return false;
            }
        }
        self.last_emit = Some(now);
        self.last = Some(progress);
        true
    }
}
