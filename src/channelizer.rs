//! Frequency agile decimating channelizer
//!
//! Cuts a narrow channel out of the baseband with a cascade of half-band
//! stages and hands the decimated stream to a downstream sink. The cascade is
//! only ever rebuilt from the thread that owns the channelizer, between two
//! sample batches, so `feed` never sees a half-updated chain.

use tracing::{debug, info, warn};

use crate::{
    chain::{shift_factor, synthesize, ChainPlan, FilterChain, FilterChainCode, MAX_FILTER_STAGES},
    error::{Error, Result},
    halfband::FilterMode,
    message::{ChannelTarget, Message, MessageQueue, MessageSender},
    sample::{Sample, SampleVector},
    sink::{BasebandSampleSink, MessageHandler, SampleFeed},
};

#[derive(Debug)]
pub struct Channelizer<S> {
    sink: Option<S>,
    input: MessageQueue,
    report: Option<MessageSender>,
    baseband_sample_rate: u32,
    device_center_frequency: u64,
    // Last accepted request, replayed on every baseband rate change
    target: Option<ChannelTarget>,
    chain: FilterChain,
    channel_sample_rate: u32,
    channel_frequency_offset: i64,
    residual_offset: i64,
    output: SampleVector,
    running: bool,
}

impl<S: BasebandSampleSink> Channelizer<S> {
    pub fn new(sink: S) -> Self {
        let mut channelizer = Self::detached();
        channelizer.sink = Some(sink);
        channelizer
    }

    /// A channelizer with no downstream sink; `feed` only drains queued messages
    pub fn detached() -> Self {
        Self {
            sink: None,
            input: MessageQueue::new(),
            report: None,
            baseband_sample_rate: 0,
            device_center_frequency: 0,
            target: None,
            chain: FilterChain::default(),
            channel_sample_rate: 0,
            channel_frequency_offset: 0,
            residual_offset: 0,
            output: SampleVector::new(),
            running: false,
        }
    }

    /// Post notifications and rejections to `report` as well as downstream
    pub fn with_report(mut self, report: MessageSender) -> Self {
        self.report = Some(report);
        self
    }

    pub fn set_report(&mut self, report: Option<MessageSender>) {
        self.report = report;
    }

    /// Producer handle for this channelizer's input queue
    pub fn message_sender(&self) -> MessageSender {
        self.input.sender()
    }

    pub fn input_message_queue(&self) -> &MessageQueue {
        &self.input
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn sink_mut(&mut self) -> Option<&mut S> {
        self.sink.as_mut()
    }

    pub fn set_sink(&mut self, sink: S) -> Option<S> {
        self.sink.replace(sink)
    }

    pub fn take_sink(&mut self) -> Option<S> {
        self.sink.take()
    }

    pub fn baseband_sample_rate(&self) -> u32 {
        self.baseband_sample_rate
    }

    pub fn device_center_frequency(&self) -> u64 {
        self.device_center_frequency
    }

    pub fn channel_sample_rate(&self) -> u32 {
        self.channel_sample_rate
    }

    pub fn channel_frequency_offset(&self) -> i64 {
        self.channel_frequency_offset
    }

    pub fn residual_offset(&self) -> i64 {
        self.residual_offset
    }

    pub fn log2_decim(&self) -> u32 {
        self.chain.len() as u32
    }

    pub fn filter_chain_code(&self) -> FilterChainCode {
        self.chain.code()
    }

    pub fn modes(&self) -> Vec<FilterMode> {
        self.chain.modes()
    }

    pub fn target(&self) -> Option<ChannelTarget> {
        self.target
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Apply every queued message, in order. Called at the top of each batch.
    pub fn handle_input_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.input.pop() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Apply a request right away. On error nothing changes.
    pub fn configure(&mut self, target: ChannelTarget) -> Result<()> {
        match target {
            ChannelTarget::Offset {
                sample_rate,
                center_frequency,
            } => self.apply_channelization(sample_rate, center_frequency),
            ChannelTarget::FilterChain { log2_decim, code } => {
                self.apply_decimation(log2_decim, code)
            }
        }
    }

    /// Search for and install the chain best fitting a channel of
    /// `sample_rate` Hz centered `center_frequency` Hz from baseband center
    pub fn apply_channelization(&mut self, sample_rate: u32, center_frequency: i64) -> Result<()> {
        let target = ChannelTarget::Offset {
            sample_rate,
            center_frequency,
        };
        if self.baseband_sample_rate == 0 {
            if sample_rate == 0 {
                return Err(Error::ZeroSampleRate);
            }
            debug!(sample_rate, center_frequency, "Baseband rate unknown, deferring channelization");
            self.target = Some(target);
            return Ok(());
        }
        let plan = synthesize(
            self.baseband_sample_rate,
            sample_rate,
            center_frequency,
            MAX_FILTER_STAGES,
        )?;
        self.target = Some(target);
        self.install(plan);
        Ok(())
    }

    /// Install an explicit chain of `log2_decim` stages described by `code`
    pub fn apply_decimation(&mut self, log2_decim: u32, code: FilterChainCode) -> Result<()> {
        let modes = code.to_modes(log2_decim)?;
        self.target = Some(ChannelTarget::FilterChain { log2_decim, code });
        if self.baseband_sample_rate == 0 {
            debug!(log2_decim, code = code.0, "Baseband rate unknown, deferring decimation");
            return Ok(());
        }
        let frequency_offset = self.baseband_sample_rate as f64 * shift_factor(&modes);
        self.install(ChainPlan {
            modes,
            frequency_offset,
            residual_offset: 0.0,
        });
        Ok(())
    }

    /// Upstream rate change: replay the current request against the new rate.
    /// If it no longer fits, the installed stages stay and only the derived
    /// rate and offset follow the new baseband.
    pub fn set_baseband_sample_rate(&mut self, baseband_sample_rate: u32) {
        if baseband_sample_rate == self.baseband_sample_rate {
            return;
        }
        self.baseband_sample_rate = baseband_sample_rate;
        let Some(target) = self.target else {
            self.install(ChainPlan {
                modes: Vec::new(),
                frequency_offset: 0.0,
                residual_offset: 0.0,
            });
            return;
        };
        if let Err(err) = self.configure(target) {
            self.reject(err);
            let modes = self.chain.modes();
            self.channel_sample_rate = baseband_sample_rate >> modes.len();
            self.channel_frequency_offset =
                (baseband_sample_rate as f64 * shift_factor(&modes)).round() as i64;
            self.residual_offset = match target {
                ChannelTarget::Offset {
                    center_frequency, ..
                } => center_frequency - self.channel_frequency_offset,
                ChannelTarget::FilterChain { .. } => 0,
            };
            self.notify();
        }
    }

    fn install(&mut self, plan: ChainPlan) {
        if plan.modes != self.chain.modes() {
            self.chain = FilterChain::from_modes(&plan.modes);
        }
        self.channel_sample_rate = self.baseband_sample_rate >> plan.modes.len();
        self.channel_frequency_offset = plan.frequency_offset.round() as i64;
        self.residual_offset = plan.residual_offset.round() as i64;
        info!(
            baseband = self.baseband_sample_rate,
            stages = plan.modes.len(),
            modes = ?plan.modes,
            code = plan.code().0,
            channel_sample_rate = self.channel_sample_rate,
            offset = self.channel_frequency_offset,
            residual = self.residual_offset,
            "Installed filter chain"
        );
        self.notify();
    }

    fn notify(&mut self) {
        let notification = Message::ChannelizerNotification {
            sample_rate: self.channel_sample_rate,
            frequency_offset: self.channel_frequency_offset,
            residual_offset: self.residual_offset,
        };
        if let Some(report) = &self.report {
            report.push(notification.clone());
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.handle_message(notification);
        }
    }

    fn reject(&mut self, err: Error) {
        warn!(%err, "Rejected channel configuration, keeping previous chain");
        if let Some(report) = &self.report {
            report.push(Message::ChannelizerRejected(err));
        }
    }
}

impl<S: BasebandSampleSink> SampleFeed for Channelizer<S> {
    fn feed(&mut self, samples: &[Sample]) {
        self.handle_input_messages();
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        self.chain.process(samples, &mut self.output);
        if !self.output.is_empty() {
            sink.feed(&self.output);
            self.output.clear();
        }
    }
}

impl<S: BasebandSampleSink> MessageHandler for Channelizer<S> {
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::ConfigureChannelizer(target) => {
                if let Err(err) = self.configure(target) {
                    self.reject(err);
                }
                true
            }
            Message::SignalNotification {
                baseband_sample_rate,
                center_frequency,
            } => {
                self.device_center_frequency = center_frequency;
                self.set_baseband_sample_rate(baseband_sample_rate);
                true
            }
            Message::StartStop(true) => {
                self.start();
                true
            }
            Message::StartStop(false) => {
                self.stop();
                true
            }
            other => match self.sink.as_mut() {
                Some(sink) => sink.handle_message(other),
                None => {
                    debug!(kind = other.kind(), "No sink for message");
                    false
                }
            },
        }
    }
}

impl<S: BasebandSampleSink> BasebandSampleSink for Channelizer<S> {
    fn start(&mut self) {
        self.running = true;
        if let Some(sink) = self.sink.as_mut() {
            sink.start();
        }
    }

    fn stop(&mut self) {
        self.running = false;
        if let Some(sink) = self.sink.as_mut() {
            sink.stop();
        }
    }
}
