//! Error types for channelizer and pipeline operations.

use thiserror::Error;

/// Result type for channelizer and pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while configuring or running the core.
///
/// Configuration errors are returned to the caller and also travel back
/// across threads inside [`crate::message::Message::ChannelizerRejected`],
/// hence `Clone` and `PartialEq`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A sample rate of zero was requested.
    #[error("channel sample rate must be greater than zero")]
    ZeroSampleRate,

    /// Requested channel is wider than the baseband it is cut from.
    #[error("requested channel rate {requested} Hz exceeds baseband rate {baseband} Hz")]
    RateExceedsBaseband { requested: u32, baseband: u32 },

    /// Requested channel does not lie inside the baseband Nyquist span.
    #[error("channel [{start}, {end}] Hz lies outside the baseband span of +/-{half_span} Hz")]
    OffsetOutOfBand { start: f64, end: f64, half_span: f64 },

    /// Filter chain code does not fit the requested number of stages.
    #[error("filter chain code {code} is out of range for {stages} stages")]
    InvalidChainCode { code: u32, stages: u32 },

    /// More half-band stages than the chain supports.
    #[error("{stages} decimation stages exceed the limit of {max}")]
    TooManyStages { stages: u32, max: u32 },

    /// A FIFO cannot hold zero samples.
    #[error("fifo capacity must be greater than zero")]
    ZeroCapacity,

    /// The pipeline thread is already running.
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// The pipeline thread could not be spawned or joined.
    #[error("pipeline thread error: {0}")]
    Thread(String),
}

impl Error {
    /// True for errors caused by an infeasible channel request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ZeroSampleRate
                | Error::RateExceedsBaseband { .. }
                | Error::OffsetOutOfBand { .. }
                | Error::InvalidChainCode { .. }
                | Error::TooManyStages { .. }
        )
    }
}
