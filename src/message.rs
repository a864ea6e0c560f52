//! Control messages and the queue that carries them between threads
//!
//! Every cross-thread mutation of live DSP state goes through here: a producer
//! builds a [`Message`] and pushes it, handing over ownership, and the thread
//! that owns the state drains its [`MessageQueue`] between sample batches.

use crossbeam_channel::{unbounded, Receiver, Sender, TryIter};

use crate::{chain::FilterChainCode, error::Error};

/// What a `ConfigureChannelizer` request asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelTarget {
    /// Search for the chain that best fits a channel of `sample_rate` Hz
    /// centered `center_frequency` Hz away from the baseband center
    Offset { sample_rate: u32, center_frequency: i64 },
    /// Install an explicit, persisted chain without searching
    FilterChain { log2_decim: u32, code: FilterChainCode },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Any thread -> channelizer: (re)build the filter chain
    ConfigureChannelizer(ChannelTarget),
    /// Channelizer -> downstream: effective post-chain rate and placement
    ChannelizerNotification {
        sample_rate: u32,
        /// Center of the extracted sub-band relative to baseband center
        frequency_offset: i64,
        /// What is left for the downstream NCO to shift
        residual_offset: i64,
    },
    /// Channelizer -> report queue: a configuration was refused
    ChannelizerRejected(Error),
    /// Device engine -> every channelizer: upstream rate changed
    SignalNotification {
        baseband_sample_rate: u32,
        center_frequency: u64,
    },
    /// Lifecycle request forwarded to the wrapped sink
    StartStop(bool),
}

impl Message {
    /// Short tag used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ConfigureChannelizer(_) => "ConfigureChannelizer",
            Message::ChannelizerNotification { .. } => "ChannelizerNotification",
            Message::ChannelizerRejected(_) => "ChannelizerRejected",
            Message::SignalNotification { .. } => "SignalNotification",
            Message::StartStop(_) => "StartStop",
        }
    }
}

/// Producer half of a [`MessageQueue`], cheap to clone into any thread
#[derive(Debug, Clone)]
pub struct MessageSender {
    sender: Sender<Message>,
}

impl MessageSender {
    /// Hand a message to the queue. Returns false if the consumer is gone,
    /// in which case the message is dropped.
    pub fn push(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Multi-producer, single-consumer FIFO of messages.
///
/// Messages pushed from one thread are popped in push order; pushes from
/// different threads are popped in the order the queue accepted them.
#[derive(Debug)]
pub struct MessageQueue {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            sender: self.sender.clone(),
        }
    }

    pub fn push(&self, message: Message) {
        // We hold a receiver ourselves, so this cannot fail
        let _ = self.sender.send(message);
    }

    pub fn pop(&self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// Pop everything queued right now, in order
    pub fn drain(&self) -> TryIter<'_, Message> {
        self.receiver.try_iter()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Wake-up source for event loops waiting on "queue has a message"
    pub fn receiver(&self) -> &Receiver<Message> {
        &self.receiver
    }
}
