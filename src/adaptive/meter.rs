//! Access meters
//!
//! The scheduler only consumes percentages; how they are counted is up to the
//! meter. Read and write percentages are independent and need not sum to 100.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of an adaptive map's read/write mix
pub trait AccessMeter: Send + Sync {
    fn record_read(&self);

    fn record_write(&self);

    /// Share of reads in the current window, 0..=100
    fn read_percent(&self) -> u32;

    /// Share of writes in the current window, 0..=100
    fn write_percent(&self) -> u32;

    /// Start a new measurement window
    fn reset(&self) {}
}

/// Counts reads and writes since the last reset
///
/// Both percentages are taken over the same total, so for this meter they
/// do sum to 100 (or are both 0 in an idle window).
#[derive(Debug, Default)]
pub struct WindowedMeter {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl WindowedMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn percent_of(part: u64, other: u64) -> u32 {
        let total = part + other;
        if total == 0 {
            return 0;
        }
        (part * 100 / total) as u32
    }
}

impl AccessMeter for WindowedMeter {
    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn read_percent(&self) -> u32 {
        Self::percent_of(self.reads(), self.writes())
    }

    fn write_percent(&self) -> u32 {
        Self::percent_of(self.writes(), self.reads())
    }

    fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }
}
