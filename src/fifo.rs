//! Circular sample buffer between the device engine and a channel's DSP thread
//!
//! [`SampleFifo`] is the buffer itself: bounded, overwriting the oldest samples
//! on overrun instead of blocking the writer, with a two part read so a reader
//! can walk the content across the wrap point without copying.
//! [`SharedSampleFifo`] puts one behind a short-lived lock and pairs it with a
//! coalescing "data ready" signal for use across threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::warn;

use crate::{
    error::{Error, Result},
    sample::{Sample, SampleVector},
};

/// The readable content at the time of a `read_begin`, oldest first.
/// `second` is only non-empty when the content wraps past the array end.
#[derive(Debug, Clone, Copy)]
pub struct ReadParts<'a> {
    pub first: &'a [Sample],
    pub second: &'a [Sample],
}

impl ReadParts<'_> {
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.first.iter().chain(self.second.iter())
    }
}

#[derive(Debug, Clone)]
pub struct SampleFifo {
    data: Vec<Sample>,
    head: usize,
    fill: usize,
    overrun: u64,
}

impl SampleFifo {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::ZeroCapacity);
        }
        Ok(Self {
            data: vec![Sample::default(); size],
            head: 0,
            fill: 0,
            overrun: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Samples available to the reader
    pub fn fill(&self) -> usize {
        self.fill
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    /// Total samples lost to overrun since creation or the last resize
    pub fn overrun_count(&self) -> u64 {
        self.overrun
    }

    /// Resize, discarding all content
    pub fn set_size(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::ZeroCapacity);
        }
        self.data = vec![Sample::default(); size];
        self.reset();
        self.overrun = 0;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.fill = 0;
    }

    /// Append samples. When there is not enough room the oldest content is
    /// dropped to make space. Returns how many samples were dropped.
    pub fn write(&mut self, samples: &[Sample]) -> usize {
        let size = self.size();
        // Only the newest `size` samples of an oversized write can survive
        let skipped = samples.len().saturating_sub(size);
        let samples = &samples[skipped..];
        let n = samples.len();

        let evicted = (self.fill + n).saturating_sub(size);
        if evicted > 0 {
            self.head = (self.head + evicted) % size;
            self.fill -= evicted;
        }

        let tail = (self.head + self.fill) % size;
        let first = n.min(size - tail);
        self.data[tail..tail + first].copy_from_slice(&samples[..first]);
        self.data[..n - first].copy_from_slice(&samples[first..]);
        self.fill += n;

        let dropped = skipped + evicted;
        self.overrun += dropped as u64;
        dropped
    }

    /// Borrow up to `max` of the oldest samples without consuming them
    pub fn read_begin(&self, max: usize) -> ReadParts<'_> {
        let count = max.min(self.fill);
        let first = count.min(self.size() - self.head);
        ReadParts {
            first: &self.data[self.head..self.head + first],
            second: &self.data[..count - first],
        }
    }

    /// Consume `count` samples; must follow a `read_begin` with the number of
    /// samples actually processed
    pub fn read_commit(&mut self, count: usize) {
        let count = count.min(self.fill);
        self.head = (self.head + count) % self.size();
        self.fill -= count;
    }
}

/// A [`SampleFifo`] shared by one writer thread and one reader thread.
///
/// The lock is only held to copy samples in or out, never while the reader
/// processes them, so `write` never waits on DSP work.
#[derive(Debug, Clone)]
pub struct SharedSampleFifo {
    fifo: Arc<Mutex<SampleFifo>>,
    ready_tx: Sender<()>,
    ready_rx: Receiver<()>,
}

impl SharedSampleFifo {
    pub fn new(size: usize) -> Result<Self> {
        // Capacity 1: pending wake-ups coalesce into one
        let (ready_tx, ready_rx) = bounded(1);
        Ok(Self {
            fifo: Arc::new(Mutex::new(SampleFifo::new(size)?)),
            ready_tx,
            ready_rx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SampleFifo> {
        self.fifo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append samples and raise "data ready". Returns the number dropped.
    pub fn write(&self, samples: &[Sample]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        let dropped = self.lock().write(samples);
        if dropped > 0 {
            warn!(dropped, "Sample fifo overrun");
        }
        let _ = self.ready_tx.try_send(());
        dropped
    }

    /// Move up to `max` samples into `out` (cleared first). Returns the count.
    pub fn read_into(&self, out: &mut SampleVector, max: usize) -> usize {
        out.clear();
        let mut fifo = self.lock();
        let parts = fifo.read_begin(max);
        out.extend_from_slice(parts.first);
        out.extend_from_slice(parts.second);
        let count = parts.len();
        fifo.read_commit(count);
        count
    }

    pub fn fill(&self) -> usize {
        self.lock().fill()
    }

    pub fn size(&self) -> usize {
        self.lock().size()
    }

    pub fn overrun_count(&self) -> u64 {
        self.lock().overrun_count()
    }

    /// Only call while no reader is draining
    pub fn set_size(&self, size: usize) -> Result<()> {
        self.lock().set_size(size)
    }

    pub fn reset(&self) {
        self.lock().reset();
        while self.ready_rx.try_recv().is_ok() {}
    }

    /// Fires (at most once per burst of writes) when samples are available
    pub fn data_ready(&self) -> &Receiver<()> {
        &self.ready_rx
    }
}
