//! Wait counters, transfer metering and the status line sink.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters tracking how often each side of the ring had to wait.
///
/// The counters are bumped inside the wait paths while the state lock is
/// held, but reads are unsynchronized: they feed the status line and nothing
/// else, so a slightly stale value is fine.
#[derive(Debug, Default)]
pub struct Statistics {
    full: AtomicU64,
    empty: AtomicU64,
}

impl Statistics {
    pub(crate) fn note_full(&self) {
        self.full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    /// How often the producer found the ring full and waited.
    #[inline]
    pub fn full_count(&self) -> u64 {
        self.full.load(Ordering::Relaxed)
    }

    /// How often the consumer found the ring empty and waited.
    #[inline]
    pub fn empty_count(&self) -> u64 {
        self.empty.load(Ordering::Relaxed)
    }
}

/// Byte and block counter for one transfer direction.
#[derive(Debug)]
pub struct Meter {
    started: Instant,
    bytes: u64,
    blocks: u64,
}

impl Meter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            bytes: 0,
            blocks: 0,
        }
    }

    /// Records one transferred block.
    pub fn update(&mut self, len: usize) {
        self.bytes += len as u64;
        self.blocks += 1;
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    #[inline]
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Seconds elapsed since the meter was created.
    pub fn seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Transfer rate in bytes per second.
    pub fn rate(&self) -> f64 {
        let secs = self.seconds();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Average block size in bytes.
    pub fn avg_block_size(&self) -> f64 {
        if self.blocks > 0 {
            self.bytes as f64 / self.blocks as f64
        } else {
            0.0
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized status output on stderr.
///
/// Status lines are progress reports rewritten in place with a carriage
/// return; both workers may emit them, so writes go through a mutex. Other
/// diagnostics use `tracing` and are line-oriented, which keeps them
/// readable even when they land on top of a status line.
#[derive(Debug, Default)]
pub struct StatusLine {
    inner: Mutex<StatusInner>,
}

#[derive(Debug, Default)]
struct StatusInner {
    dirty: bool,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites the status line in place. Trailing blanks wipe leftovers
    /// from a longer previous line.
    pub fn update(&self, line: &str) {
        let mut inner = self.inner.lock();
        let mut err = io::stderr().lock();
        let _ = write!(err, "{line}  \r");
        let _ = err.flush();
        inner.dirty = true;
    }

    /// Terminates the status display with a newline, if anything was written.
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        if inner.dirty {
            let mut err = io::stderr().lock();
            let _ = writeln!(err);
            let _ = err.flush();
            inner.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_tracks_bytes_and_blocks() {
        let mut meter = Meter::new();
        meter.update(4096);
        meter.update(4096);
        meter.update(2048);
        assert_eq!(meter.bytes(), 10_240);
        assert_eq!(meter.blocks(), 3);
        assert!((meter.avg_block_size() - 10_240.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_meter_has_no_rate() {
        let meter = Meter::new();
        assert_eq!(meter.bytes(), 0);
        assert_eq!(meter.avg_block_size(), 0.0);
    }

    #[test]
    fn statistics_start_at_zero() {
        let stats = Statistics::default();
        assert_eq!(stats.full_count(), 0);
        assert_eq!(stats.empty_count(), 0);
        stats.note_full();
        stats.note_empty();
        stats.note_empty();
        assert_eq!(stats.full_count(), 1);
        assert_eq!(stats.empty_count(), 2);
    }
}
