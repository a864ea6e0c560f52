use std::{
    f64::consts::TAU,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::Rng;
use sdr_channelizer::{
    nco::Nco,
    sample::{from_fixed, mean_power, to_fixed},
    BasebandDispatcher, BasebandSampleSink, Channelizer, FilterChainCode, Message,
    MessageHandler, MessageQueue, Sample, SampleFeed, SampleVector, ThreadedSamplePipeline,
};
use tracing::{error, info, warn};

mod args;

use args::{convert_filter, Args};

/// Power readings are averaged over this many channel samples
const METER_WINDOW: usize = 8192;

/// Downstream end of the demo channel: removes the residual offset with an NCO
/// and reports the mean power of what is left.
struct PowerMeter {
    nco: Nco,
    scratch: SampleVector,
    acc: f64,
    count: usize,
    readings: Sender<f32>,
}

impl PowerMeter {
    fn new(readings: Sender<f32>) -> Self {
        Self {
            nco: Nco::new(0.0, 0.0),
            scratch: SampleVector::new(),
            acc: 0.0,
            count: 0,
            readings,
        }
    }
}

impl SampleFeed for PowerMeter {
    fn feed(&mut self, samples: &[Sample]) {
        self.scratch.clear();
        self.scratch.extend_from_slice(samples);
        self.nco.mix(&mut self.scratch);
        let mut rest = &self.scratch[..];
        while !rest.is_empty() {
            let (head, tail) = rest.split_at(rest.len().min(METER_WINDOW - self.count));
            self.acc += mean_power(head) as f64 * head.len() as f64;
            self.count += head.len();
            rest = tail;
            if self.count == METER_WINDOW {
                // We don't care if the reader is lagging
                let _ = self.readings.try_send((self.acc / METER_WINDOW as f64) as f32);
                self.acc = 0.0;
                self.count = 0;
            }
        }
    }
}

impl MessageHandler for PowerMeter {
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::ChannelizerNotification {
                sample_rate,
                residual_offset,
                ..
            } => {
                self.nco.set_frequency(residual_offset as f64, sample_rate as f64);
                true
            }
            _ => false,
        }
    }
}

impl BasebandSampleSink for PowerMeter {}

/// Stand-in for a device engine: a tone plus a little noise, quantized to
/// 16 bit I/Q like an ADC would, paced at the baseband rate and pushed through
/// the dispatcher until told to stop.
fn generate(mut dispatcher: BasebandDispatcher, args: &Args, running: Arc<AtomicBool>) {
    let mut rng = rand::thread_rng();
    let mut raw = vec![(0i16, 0i16); args.block_size];
    let mut block = SampleVector::with_capacity(args.block_size);
    let step = args.tone_offset as f64 / args.sample_rate as f64;
    let block_time = Duration::from_secs_f64(args.block_size as f64 / args.sample_rate as f64);
    let mut phase = 0f64;
    let start = Instant::now();
    let mut sent = 0u32;
    dispatcher.start();
    while running.load(Ordering::Relaxed) {
        for iq in raw.iter_mut() {
            let noise = Sample::new(rng.gen_range(-0.01..0.01), rng.gen_range(-0.01..0.01));
            *iq = to_fixed(Sample::from_polar(0.5, (TAU * phase) as f32) + noise);
            phase = (phase + step).rem_euclid(1.0);
        }
        block.clear();
        block.extend(raw.iter().map(|&(i, q)| from_fixed(i, q)));
        dispatcher.feed(&block);
        sent += 1;
        // Sleep off whatever time we are ahead of the device clock
        if let Some(ahead) = (block_time * sent).checked_sub(start.elapsed()) {
            thread::sleep(ahead);
        }
    }
    dispatcher.stop();
}

fn log_reports(reports: &MessageQueue, readings: &Receiver<f32>) {
    for report in reports.drain() {
        match report {
            Message::ChannelizerNotification {
                sample_rate,
                frequency_offset,
                residual_offset,
            } => info!(sample_rate, frequency_offset, residual_offset, "Channel placed"),
            Message::ChannelizerRejected(err) if err.is_configuration() => {
                warn!(%err, "Channel request rejected")
            }
            Message::ChannelizerRejected(err) => error!(%err, "Channelizer failed"),
            _ => {}
        }
    }
    if let Some(power) = readings.try_iter().last() {
        info!(power_db = 10.0 * power.max(1e-12).log10(), "In-channel power");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    // Setup the channel
    let (reading_tx, reading_rx) = bounded(64);
    let reports = MessageQueue::new();
    let mut channelizer = Channelizer::new(PowerMeter::new(reading_tx)).with_report(reports.sender());
    match args.log2_decim {
        Some(log2_decim) => {
            let code = args
                .chain_code
                .map(FilterChainCode)
                .unwrap_or_else(|| FilterChainCode::centered(log2_decim));
            channelizer.apply_decimation(log2_decim, code)?;
        }
        None => channelizer.apply_channelization(args.channel_rate, args.offset)?,
    }

    // Give it its own thread, fed by the synthetic device through a dispatcher
    let mut pipeline = ThreadedSamplePipeline::new("channel-0", channelizer, args.fifo_size)?;
    pipeline.start()?;
    let mut dispatcher = BasebandDispatcher::new();
    dispatcher.add_sink(Box::new(pipeline.input()));
    dispatcher.set_sample_rate(args.sample_rate, args.center_frequency);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::Relaxed))?;

    let duration = Duration::from_secs(args.duration);
    info!(
        sample_rate = args.sample_rate,
        tone_offset = args.tone_offset,
        "Starting synthetic device"
    );
    let producer = {
        let running = running.clone();
        thread::Builder::new()
            .name("device".into())
            .spawn(move || generate(dispatcher, &args, running))?
    };

    let start = Instant::now();
    let mut last = pipeline.stats();
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_secs(1));
        log_reports(&reports, &reading_rx);
        let now = pipeline.stats();
        info!(stats = ?now.since(&last), fill = pipeline.fifo_fill(), "Pipeline");
        last = now;
        if duration > Duration::ZERO && start.elapsed() >= duration {
            break;
        }
    }
    running.store(false, Ordering::Relaxed);

    if producer.join().is_err() {
        warn!("Device thread panicked");
    }
    pipeline.stop()?;
    log_reports(&reports, &reading_rx);
    info!(stats = ?pipeline.stats(), "Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_power_meter_spans_feed_boundaries() {
        let (tx, rx) = bounded(8);
        let mut meter = PowerMeter::new(tx);
        let ones = vec![Sample::new(1.0, 0.0); 5000];
        meter.feed(&ones);
        assert!(rx.try_recv().is_err());
        meter.feed(&ones);
        assert_relative_eq!(rx.try_recv().unwrap(), 1.0, epsilon = 1e-6);
        assert!(rx.try_recv().is_err());
        assert_eq!(meter.count, 10_000 - METER_WINDOW);
        meter.feed(&ones[..METER_WINDOW * 2]);
        assert_eq!(rx.try_iter().count(), 2);
    }
}
