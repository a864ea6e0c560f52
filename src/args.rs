//! Argument parsing for running from the command line

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Baseband sample rate of the synthetic device, in Hz
    #[clap(short, long, default_value_t = 2_000_000)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..))]
    pub sample_rate: u32,
    /// Device center frequency in Hz (reported only)
    #[clap(long, default_value_t = 100_000_000)]
    pub center_frequency: u64,
    /// Requested channel sample rate, in Hz
    #[clap(short = 'r', long, default_value_t = 250_000)]
    pub channel_rate: u32,
    /// Requested channel center, relative to baseband center, in Hz
    #[clap(short, long, default_value_t = 500_000, allow_hyphen_values = true)]
    pub offset: i64,
    /// Install an explicit chain of this many half-band stages instead of searching
    #[clap(long)]
    pub log2_decim: Option<u32>,
    /// Base 3 filter chain code for --log2-decim (defaults to all center stages)
    #[clap(long)]
    pub chain_code: Option<u32>,
    /// Channel fifo capacity, in samples
    #[clap(short, long, default_value_t = sdr_channelizer::DEFAULT_FIFO_SIZE)]
    pub fifo_size: usize,
    /// Offset of the synthetic test tone from baseband center, in Hz
    #[clap(short, long, default_value_t = 512_000, allow_hyphen_values = true)]
    pub tone_offset: i64,
    /// Samples per device buffer
    #[clap(short, long, default_value_t = 16_384)]
    pub block_size: usize,
    /// Seconds to run, 0 runs until interrupted
    #[clap(short, long, default_value_t = 10)]
    pub duration: u64,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
