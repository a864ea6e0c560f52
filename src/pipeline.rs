//! Gives any sink its own thread
//!
//! Upstream callers only ever write into a [`SharedSampleFifo`] and push onto a
//! message queue. The pipeline thread waits on both, flushes pending messages,
//! then drains the fifo into the wrapped sink, so the sink never sees `feed`
//! and `handle_message` concurrently.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    fifo::SharedSampleFifo,
    message::{Message, MessageQueue, MessageSender},
    monitoring::{PipelineStats, StatsSnapshot},
    sample::{Sample, SampleVector},
    sink::{BasebandSampleSink, MessageHandler, SampleFeed},
};

/// Cloneable upstream end of a pipeline, for the device engine thread
#[derive(Debug, Clone)]
pub struct PipelineInput {
    fifo: SharedSampleFifo,
    messages: MessageSender,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
}

impl PipelineInput {
    /// Never blocks on the consumer. Samples fed while the pipeline is
    /// stopped are dropped.
    pub fn push_samples(&self, samples: &[Sample]) {
        if !self.running.load(Ordering::Acquire) {
            self.stats.record_dropped(samples.len());
            return;
        }
        let dropped = self.fifo.write(samples);
        self.stats.record_written(samples.len());
        self.stats.record_dropped(dropped);
    }

    pub fn push_message(&self, message: Message) -> bool {
        self.messages.push(message)
    }
}

impl SampleFeed for PipelineInput {
    fn feed(&mut self, samples: &[Sample]) {
        self.push_samples(samples)
    }
}

impl MessageHandler for PipelineInput {
    fn handle_message(&mut self, message: Message) -> bool {
        self.push_message(message)
    }
}

impl BasebandSampleSink for PipelineInput {}

struct Worker<S> {
    shutdown: Sender<()>,
    handle: JoinHandle<(S, MessageQueue)>,
}

pub struct ThreadedSamplePipeline<S: BasebandSampleSink + 'static> {
    name: String,
    input: PipelineInput,
    // Present while stopped; owned by the worker thread while running
    sink: Option<S>,
    queue: Option<MessageQueue>,
    worker: Option<Worker<S>>,
}

impl<S: BasebandSampleSink + 'static> ThreadedSamplePipeline<S> {
    pub fn new(name: impl Into<String>, sink: S, fifo_size: usize) -> Result<Self> {
        let queue = MessageQueue::new();
        Ok(Self {
            name: name.into(),
            input: PipelineInput {
                fifo: SharedSampleFifo::new(fifo_size)?,
                messages: queue.sender(),
                running: Arc::new(AtomicBool::new(false)),
                stats: Arc::new(PipelineStats::default()),
            },
            sink: Some(sink),
            queue: Some(queue),
            worker: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> PipelineInput {
        self.input.clone()
    }

    pub fn message_sender(&self) -> MessageSender {
        self.input.messages.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.input.stats.snapshot()
    }

    pub fn fifo_fill(&self) -> usize {
        self.input.fifo.fill()
    }

    /// The wrapped sink, only reachable while stopped
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.sink.as_mut()
    }

    /// Resize the fifo. Content is discarded; refused while running.
    pub fn set_fifo_size(&mut self, size: usize) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        self.input.fifo.set_size(size)
    }

    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let (Some(sink), Some(queue)) = (self.sink.take(), self.queue.take()) else {
            return Err(Error::Thread("pipeline lost its sink".into()));
        };
        let (shutdown, shutdown_rx) = bounded(1);
        let fifo = self.input.fifo.clone();
        let stats = self.input.stats.clone();
        fifo.reset();
        self.input.running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run(sink, queue, fifo, shutdown_rx, stats));
        match spawned {
            Ok(handle) => {
                info!(name = %self.name, "Started sample pipeline");
                self.worker = Some(Worker { shutdown, handle });
                Ok(())
            }
            Err(err) => {
                // The closure and everything it owned is gone with the failed spawn
                self.input.running.store(false, Ordering::Release);
                Err(Error::Thread(err.to_string()))
            }
        }
    }

    /// Ask the thread to leave its loop and wait for it. The sink comes back
    /// to this handle, so the pipeline can be started again.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.input.running.store(false, Ordering::Release);
        let _ = worker.shutdown.send(());
        match worker.handle.join() {
            Ok((sink, queue)) => {
                self.sink = Some(sink);
                self.queue = Some(queue);
                info!(name = %self.name, stats = ?self.stats(), "Stopped sample pipeline");
                Ok(())
            }
            Err(_) => Err(Error::Thread(format!("{} panicked", self.name))),
        }
    }
}

impl<S: BasebandSampleSink + 'static> Drop for ThreadedSamplePipeline<S> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(%err, "Pipeline did not shut down cleanly");
        }
    }
}

impl<S: BasebandSampleSink + 'static> SampleFeed for ThreadedSamplePipeline<S> {
    fn feed(&mut self, samples: &[Sample]) {
        self.input.push_samples(samples)
    }
}

impl<S: BasebandSampleSink + 'static> MessageHandler for ThreadedSamplePipeline<S> {
    fn handle_message(&mut self, message: Message) -> bool {
        self.input.push_message(message)
    }
}

impl<S: BasebandSampleSink + 'static> BasebandSampleSink for ThreadedSamplePipeline<S> {
    fn start(&mut self) {
        if let Err(err) = ThreadedSamplePipeline::start(self) {
            warn!(%err, "Could not start pipeline");
        }
    }

    fn stop(&mut self) {
        if let Err(err) = ThreadedSamplePipeline::stop(self) {
            warn!(%err, "Could not stop pipeline");
        }
    }
}

fn handle_pending<S: BasebandSampleSink>(sink: &mut S, queue: &MessageQueue, stats: &PipelineStats) {
    for message in queue.drain() {
        let kind = message.kind();
        if !sink.handle_message(message) {
            debug!(kind, "Message not handled by sink");
        }
        stats.record_message();
    }
}

fn drain_fifo<S: BasebandSampleSink>(
    sink: &mut S,
    queue: &MessageQueue,
    fifo: &SharedSampleFifo,
    buffer: &mut SampleVector,
    stats: &PipelineStats,
) {
    loop {
        // Configuration only ever changes between two batches
        handle_pending(sink, queue, stats);
        let n = fifo.read_into(buffer, usize::MAX);
        if n == 0 {
            break;
        }
        sink.feed(buffer);
        stats.record_batch(n);
    }
}

fn run<S: BasebandSampleSink>(
    mut sink: S,
    queue: MessageQueue,
    fifo: SharedSampleFifo,
    shutdown: Receiver<()>,
    stats: Arc<PipelineStats>,
) -> (S, MessageQueue) {
    let mut buffer = SampleVector::with_capacity(fifo.size());
    sink.start();
    handle_pending(&mut sink, &queue, &stats);
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(queue.receiver()) -> message => {
                if let Ok(message) = message {
                    let kind = message.kind();
                    if !sink.handle_message(message) {
                        debug!(kind, "Message not handled by sink");
                    }
                    stats.record_message();
                }
                handle_pending(&mut sink, &queue, &stats);
            }
            recv(fifo.data_ready()) -> _ => {
                drain_fifo(&mut sink, &queue, &fifo, &mut buffer, &stats);
            }
        }
    }
    sink.stop();
    (sink, queue)
}
