//! Device engine side fan-out: one baseband stream, many channel sinks

use tracing::{debug, info};

use crate::{
    message::Message,
    sample::Sample,
    sink::{BasebandSampleSink, MessageHandler, SampleFeed},
};

/// Owns the sinks attached to one device and feeds each of them the same
/// baseband, in registration order.
#[derive(Default)]
pub struct BasebandDispatcher {
    sinks: Vec<Box<dyn BasebandSampleSink>>,
    sample_rate: u32,
    center_frequency: u64,
    running: bool,
}

impl BasebandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn center_frequency(&self) -> u64 {
        self.center_frequency
    }

    fn signal(&self) -> Message {
        Message::SignalNotification {
            baseband_sample_rate: self.sample_rate,
            center_frequency: self.center_frequency,
        }
    }

    /// Attach a sink. It immediately learns the current rate if there is one,
    /// and is started if the device already runs.
    pub fn add_sink(&mut self, mut sink: Box<dyn BasebandSampleSink>) -> usize {
        if self.sample_rate > 0 {
            sink.handle_message(self.signal());
        }
        if self.running {
            sink.start();
        }
        self.sinks.push(sink);
        debug!(sinks = self.sinks.len(), "Added baseband sink");
        self.sinks.len() - 1
    }

    pub fn remove_sink(&mut self, index: usize) -> Option<Box<dyn BasebandSampleSink>> {
        if index >= self.sinks.len() {
            return None;
        }
        let mut sink = self.sinks.remove(index);
        if self.running {
            sink.stop();
        }
        Some(sink)
    }

    /// Upstream rate or tuning change, broadcast to every sink
    pub fn set_sample_rate(&mut self, sample_rate: u32, center_frequency: u64) {
        if sample_rate == self.sample_rate && center_frequency == self.center_frequency {
            return;
        }
        self.sample_rate = sample_rate;
        self.center_frequency = center_frequency;
        info!(sample_rate, center_frequency, sinks = self.sinks.len(), "Baseband changed");
        let signal = self.signal();
        for sink in self.sinks.iter_mut() {
            sink.handle_message(signal.clone());
        }
    }

    pub fn feed(&mut self, samples: &[Sample]) {
        for sink in self.sinks.iter_mut() {
            sink.feed(samples);
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        for sink in self.sinks.iter_mut() {
            sink.start();
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
        for sink in self.sinks.iter_mut() {
            sink.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channelizer::Channelizer, sink::CollectingSink};
    use std::sync::{Arc, Mutex};

    /// Shares what it sees with the test through an `Arc`
    #[derive(Clone, Default)]
    struct Probe(Arc<Mutex<CollectingSink>>);

    impl SampleFeed for Probe {
        fn feed(&mut self, samples: &[Sample]) {
            self.0.lock().unwrap().feed(samples)
        }
    }

    impl MessageHandler for Probe {
        fn handle_message(&mut self, message: Message) -> bool {
            self.0.lock().unwrap().handle_message(message)
        }
    }

    impl BasebandSampleSink for Probe {
        fn start(&mut self) {
            self.0.lock().unwrap().start()
        }
    }

    #[test]
    fn test_fan_out_and_late_join() {
        let a = Probe::default();
        let b = Probe::default();
        let mut dispatcher = BasebandDispatcher::new();
        dispatcher.add_sink(Box::new(a.clone()));
        dispatcher.set_sample_rate(1_000_000, 433_920_000);
        dispatcher.start();
        dispatcher.feed(&[Sample::new(1.0, 0.0); 8]);
        dispatcher.add_sink(Box::new(b.clone()));
        dispatcher.feed(&[Sample::new(2.0, 0.0); 4]);

        let a = a.0.lock().unwrap();
        let b = b.0.lock().unwrap();
        assert_eq!(a.samples.len(), 12);
        assert_eq!(b.samples.len(), 4);
        assert!(a.running && b.running);
        let signal = Message::SignalNotification {
            baseband_sample_rate: 1_000_000,
            center_frequency: 433_920_000,
        };
        assert_eq!(a.messages, vec![signal.clone()]);
        assert_eq!(b.messages, vec![signal]);
    }

    #[test]
    fn test_rate_change_reaches_channelizer() {
        let probe = Probe::default();
        let mut channelizer = Channelizer::new(probe.clone());
        channelizer.apply_channelization(250_000, 0).unwrap();
        let mut dispatcher = BasebandDispatcher::new();
        dispatcher.add_sink(Box::new(channelizer));
        dispatcher.set_sample_rate(2_000_000, 0);
        dispatcher.feed(&vec![Sample::new(1.0, 0.0); 800]);
        let seen = probe.0.lock().unwrap();
        assert_eq!(seen.samples.len(), 100);
        assert!(seen.messages.contains(&Message::ChannelizerNotification {
            sample_rate: 250_000,
            frequency_offset: 0,
            residual_offset: 0,
        }));
    }

    #[test]
    fn test_remove_sink() {
        let mut dispatcher = BasebandDispatcher::new();
        dispatcher.add_sink(Box::new(CollectingSink::default()));
        assert!(dispatcher.remove_sink(3).is_none());
        assert!(dispatcher.remove_sink(0).is_some());
        assert!(dispatcher.is_empty());
    }
}
