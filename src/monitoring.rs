//! Runtime counters for a sample pipeline.
//! Everything here is lock-free so the hot paths can bump counters freely,
//! and a snapshot can be taken from any thread for logging.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    samples_written: AtomicU64,
    samples_dropped: AtomicU64,
    samples_delivered: AtomicU64,
    batches: AtomicU64,
    messages: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Samples accepted by `feed`
    pub samples_written: u64,
    /// Samples lost to overrun, or fed while stopped
    pub samples_dropped: u64,
    /// Samples handed to the wrapped sink
    pub samples_delivered: u64,
    /// Drain cycles that delivered at least one sample
    pub batches: u64,
    /// Messages dispatched to the wrapped sink
    pub messages: u64,
}

impl PipelineStats {
    pub fn record_written(&self, n: usize) {
        self.samples_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, n: usize) {
        self.samples_dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self, n: usize) {
        self.samples_delivered.fetch_add(n as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Counts accumulated since an earlier snapshot
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            samples_written: self.samples_written - earlier.samples_written,
            samples_dropped: self.samples_dropped - earlier.samples_dropped,
            samples_delivered: self.samples_delivered - earlier.samples_delivered,
            batches: self.batches - earlier.batches,
            messages: self.messages - earlier.messages,
        }
    }
}
