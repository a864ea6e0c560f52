use std::{
    thread,
    time::{Duration, Instant},
};

use sdr_channelizer::{
    sink::CollectingSink, ChannelTarget, Channelizer, Message, MessageQueue, PipelineInput,
    Sample, ThreadedSamplePipeline,
};

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn threaded_channelizer_decimates_and_notifies() {
    let channelizer = Channelizer::new(CollectingSink::default());
    let mut pipeline = ThreadedSamplePipeline::new("test-channel", channelizer, 1 << 16).unwrap();
    pipeline.start().unwrap();
    let input: PipelineInput = pipeline.input();

    input.push_message(Message::SignalNotification {
        baseband_sample_rate: 2_000_000,
        center_frequency: 100_000_000,
    });
    input.push_message(Message::ConfigureChannelizer(ChannelTarget::Offset {
        sample_rate: 250_000,
        center_frequency: 500_000,
    }));
    // Let the configuration land before any samples go in
    assert!(wait_for(Duration::from_secs(5), || pipeline.stats().messages == 2));

    let block = vec![Sample::new(0.25, 0.0); 1000];
    for _ in 0..8 {
        input.push_samples(&block);
    }
    assert!(wait_for(Duration::from_secs(5), || {
        pipeline.stats().samples_delivered == 8000
    }));
    pipeline.stop().unwrap();

    let stats = pipeline.stats();
    assert_eq!(stats.samples_written, 8000);
    assert_eq!(stats.samples_dropped, 0);

    let channelizer = pipeline.sink().unwrap();
    assert_eq!(channelizer.channel_sample_rate(), 250_000);
    assert_eq!(channelizer.channel_frequency_offset(), 500_000);
    let sink = channelizer.sink().unwrap();
    assert_eq!(sink.samples.len(), 1000);
    assert!(!sink.running);
    assert_eq!(
        sink.messages.last(),
        Some(&Message::ChannelizerNotification {
            sample_rate: 250_000,
            frequency_offset: 500_000,
            residual_offset: 0,
        })
    );
}

#[test]
fn samples_fed_while_stopped_are_dropped() {
    let mut pipeline =
        ThreadedSamplePipeline::new("stopped", CollectingSink::default(), 1024).unwrap();
    let input = pipeline.input();
    input.push_samples(&[Sample::new(1.0, 1.0); 100]);
    assert_eq!(pipeline.stats().samples_dropped, 100);
    assert_eq!(pipeline.fifo_fill(), 0);

    // A restart begins from an empty fifo, and the sink survives the round trip
    pipeline.start().unwrap();
    input.push_samples(&[Sample::new(1.0, 1.0); 10]);
    assert!(wait_for(Duration::from_secs(5), || {
        pipeline.stats().samples_delivered == 10
    }));
    pipeline.stop().unwrap();
    pipeline.start().unwrap();
    pipeline.stop().unwrap();
    assert_eq!(pipeline.sink().unwrap().samples.len(), 10);
}

#[test]
fn message_queue_keeps_per_producer_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u32 = 500;

    let queue = MessageQueue::new();
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let sender = queue.sender();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    sender.push(Message::SignalNotification {
                        baseband_sample_rate: seq,
                        center_frequency: id,
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut next = [0u32; PRODUCERS as usize];
    let mut total = 0;
    for message in queue.drain() {
        let (seq, id) = match message {
            Message::SignalNotification {
                baseband_sample_rate,
                center_frequency,
            } => (baseband_sample_rate, center_frequency),
            other => panic!("Unexpected message {other:?}"),
        };
        assert_eq!(seq, next[id as usize]);
        next[id as usize] += 1;
        total += 1;
    }
    assert_eq!(total, PRODUCERS as u32 * PER_PRODUCER);
    assert!(queue.is_empty());
}
