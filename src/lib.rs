//! Frequency agile decimating channelizer and the cross-thread sample
//! pipeline that feeds it.
//!
//! Samples flow device engine -> [`BasebandDispatcher`] -> optional
//! [`ThreadedSamplePipeline`] hop -> [`Channelizer`] -> downstream sink.
//! Control flows the other way round as [`Message`]s pushed onto queues and
//! drained by the owning thread between sample batches.

pub mod chain;
pub mod channelizer;
pub mod dispatch;
pub mod error;
pub mod fifo;
pub mod halfband;
pub mod message;
pub mod monitoring;
pub mod nco;
pub mod pipeline;
pub mod sample;
pub mod sink;

pub use chain::{FilterChain, FilterChainCode, MAX_FILTER_STAGES};
pub use channelizer::Channelizer;
pub use dispatch::BasebandDispatcher;
pub use error::{Error, Result};
pub use fifo::{SampleFifo, SharedSampleFifo};
pub use halfband::{FilterMode, FilterStage};
pub use message::{ChannelTarget, Message, MessageQueue, MessageSender};
pub use pipeline::{PipelineInput, ThreadedSamplePipeline};
pub use sample::{Sample, SampleVector};
pub use sink::{BasebandSampleSink, MessageHandler, SampleFeed};

/// Default capacity of a pipeline fifo, in samples
pub const DEFAULT_FIFO_SIZE: usize = 1 << 18;
