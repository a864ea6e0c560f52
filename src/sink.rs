//! The contract every stage of the receive path implements

use crate::{message::Message, sample::Sample};

/// Accepts a run of samples in signal time order
pub trait SampleFeed {
    fn feed(&mut self, samples: &[Sample]);
}

/// Reacts to a control message. Returns true if the message was consumed.
pub trait MessageHandler {
    fn handle_message(&mut self, message: Message) -> bool;
}

/// A sink that can sit anywhere downstream of the device engine: a
/// channelizer, a threaded pipeline hop, or a demodulator.
pub trait BasebandSampleSink: SampleFeed + MessageHandler + Send {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

impl<S: SampleFeed + ?Sized> SampleFeed for Box<S> {
    fn feed(&mut self, samples: &[Sample]) {
        (**self).feed(samples)
    }
}

impl<S: MessageHandler + ?Sized> MessageHandler for Box<S> {
    fn handle_message(&mut self, message: Message) -> bool {
        (**self).handle_message(message)
    }
}

impl<S: BasebandSampleSink + ?Sized> BasebandSampleSink for Box<S> {
    fn start(&mut self) {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Swallows everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SampleFeed for NullSink {
    fn feed(&mut self, _samples: &[Sample]) {}
}

impl MessageHandler for NullSink {
    fn handle_message(&mut self, _message: Message) -> bool {
        false
    }
}

impl BasebandSampleSink for NullSink {}

/// Keeps every sample and message it is given. Handy as the downstream end
/// of a chain when inspecting what comes out of it.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub samples: Vec<Sample>,
    pub messages: Vec<Message>,
    pub running: bool,
}

impl SampleFeed for CollectingSink {
    fn feed(&mut self, samples: &[Sample]) {
        self.samples.extend_from_slice(samples);
    }
}

impl MessageHandler for CollectingSink {
    fn handle_message(&mut self, message: Message) -> bool {
        self.messages.push(message);
        true
    }
}

impl BasebandSampleSink for CollectingSink {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }
}
