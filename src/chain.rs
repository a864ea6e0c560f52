//! Synthesis and encoding of the half-band decimation cascade
//!
//! A chain of `L` stages decimates by `2^L`. Each stage keeps the lower half,
//! the center or the upper half of its input, so the chain as a whole selects
//! one of `3^L` sub-bands of the baseband. The placement is packed into a base 3
//! [`FilterChainCode`] that callers persist and replay.

use tracing::trace;

use crate::{
    error::{Error, Result},
    halfband::{FilterMode, FilterStage},
    sample::Sample,
};

/// Deepest cascade the channelizer will build
pub const MAX_FILTER_STAGES: u32 = 12;

// Tolerance for margins that are zero on paper but not in floating point
const MARGIN_EPSILON_HZ: f64 = 1e-6;

/// Base 3 packing of a chain's stage modes.
///
/// The least significant trit describes the last (lowest rate) stage, the most
/// significant trit the first, full rate, stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FilterChainCode(pub u32);

impl FilterChainCode {
    /// Largest valid code for a chain of `stages` stages, at most
    /// `MAX_FILTER_STAGES` deep
    pub fn max_for(stages: u32) -> u32 {
        3u32.pow(stages.min(MAX_FILTER_STAGES)) - 1
    }

    pub fn from_modes(modes: &[FilterMode]) -> Self {
        Self(modes.iter().fold(0, |code, mode| code * 3 + mode.trit()))
    }

    /// Unpack into stage modes, in processing order
    pub fn to_modes(self, stages: u32) -> Result<Vec<FilterMode>> {
        if stages > MAX_FILTER_STAGES {
            return Err(Error::TooManyStages {
                stages,
                max: MAX_FILTER_STAGES,
            });
        }
        if self.0 > Self::max_for(stages) {
            return Err(Error::InvalidChainCode {
                code: self.0,
                stages,
            });
        }
        let mut rest = self.0;
        let mut modes = Vec::with_capacity(stages as usize);
        for _ in 0..stages {
            // Remainder is always < 3
            modes.push(FilterMode::from_trit(rest % 3).unwrap_or(FilterMode::Center));
            rest /= 3;
        }
        modes.reverse();
        Ok(modes)
    }

    /// Clamp an out of range persisted code to the largest valid one
    pub fn clamped(self, stages: u32) -> Self {
        Self(self.0.min(Self::max_for(stages)))
    }

    /// The all-center chain of `stages` stages
    pub fn centered(stages: u32) -> Self {
        Self(Self::max_for(stages) / 2)
    }

    /// Shift of the chain's output center as a fraction of the baseband rate
    pub fn shift_factor(self, stages: u32) -> Result<f64> {
        Ok(shift_factor(&self.to_modes(stages)?))
    }
}

/// Shift of the output center of a chain, as a fraction of its input rate
pub fn shift_factor(modes: &[FilterMode]) -> f64 {
    let mut rate = 1.0;
    let mut shift = 0.0;
    for mode in modes {
        shift += mode.shift() * rate;
        rate /= 2.0;
    }
    shift
}

/// Result of a chain search: what to install and where it lands
#[derive(Debug, Clone, PartialEq)]
pub struct ChainPlan {
    /// Stage modes in processing order
    pub modes: Vec<FilterMode>,
    /// Center of the selected sub-band relative to baseband center (Hz)
    pub frequency_offset: f64,
    /// Requested center minus `frequency_offset`, left to a downstream NCO (Hz)
    pub residual_offset: f64,
}

impl ChainPlan {
    pub fn code(&self) -> FilterChainCode {
        FilterChainCode::from_modes(&self.modes)
    }

    pub fn log2_decim(&self) -> u32 {
        self.modes.len() as u32
    }
}

/// Distance from the requested interval to the edges of a candidate band.
/// Negative when the request spills out of the candidate.
fn channel_min_space(band_start: f64, band_end: f64, req_start: f64, req_end: f64) -> f64 {
    (req_start - band_start).min(band_end - req_end)
}

/// Find the deepest cascade whose output band still contains the requested
/// channel of `sample_rate` Hz centered on `center_frequency`.
///
/// At every stage the Center, Lower and Upper candidate sub-bands are scored by
/// their spectral margin around the request; the largest margin wins, ties go
/// to the earlier candidate in that order. The search stops when no candidate
/// contains the request or when `max_stages` is reached.
pub fn synthesize(
    baseband_sample_rate: u32,
    sample_rate: u32,
    center_frequency: i64,
    max_stages: u32,
) -> Result<ChainPlan> {
    if sample_rate == 0 || baseband_sample_rate == 0 {
        return Err(Error::ZeroSampleRate);
    }
    if sample_rate > baseband_sample_rate {
        return Err(Error::RateExceedsBaseband {
            requested: sample_rate,
            baseband: baseband_sample_rate,
        });
    }
    let half_span = baseband_sample_rate as f64 / 2.0;
    let req_start = center_frequency as f64 - sample_rate as f64 / 2.0;
    let req_end = center_frequency as f64 + sample_rate as f64 / 2.0;
    if req_start < -half_span - MARGIN_EPSILON_HZ || req_end > half_span + MARGIN_EPSILON_HZ {
        return Err(Error::OffsetOutOfBand {
            start: req_start,
            end: req_end,
            half_span,
        });
    }

    let mut band_start = -half_span;
    let mut band_end = half_span;
    let mut modes = Vec::new();
    while (modes.len() as u32) < max_stages.min(MAX_FILTER_STAGES) {
        let width = band_end - band_start;
        let candidates = [
            (FilterMode::Center, band_start + width / 4.0, band_end - width / 4.0),
            (FilterMode::LowerHalf, band_start, band_start + width / 2.0),
            (FilterMode::UpperHalf, band_start + width / 2.0, band_end),
        ];
        let mut best: Option<(FilterMode, f64, f64, f64)> = None;
        for (mode, start, end) in candidates {
            let margin = channel_min_space(start, end, req_start, req_end);
            if margin < -MARGIN_EPSILON_HZ {
                continue;
            }
            if best.map_or(true, |(_, _, _, m)| margin > m + MARGIN_EPSILON_HZ) {
                best = Some((mode, start, end, margin));
            }
        }
        let Some((mode, start, end, margin)) = best else {
            break;
        };
        trace!(?mode, margin, start, end, "Chose stage placement");
        modes.push(mode);
        band_start = start;
        band_end = end;
    }

    let frequency_offset = (band_start + band_end) / 2.0;
    Ok(ChainPlan {
        modes,
        frequency_offset,
        residual_offset: center_frequency as f64 - frequency_offset,
    })
}

/// The installed cascade: an owned vector of stages, first stage at full rate
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn from_modes(modes: &[FilterMode]) -> Self {
        Self {
            stages: modes.iter().copied().map(FilterStage::new).collect(),
        }
    }

    pub fn from_code(code: FilterChainCode, stages: u32) -> Result<Self> {
        Ok(Self::from_modes(&code.to_modes(stages)?))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn modes(&self) -> Vec<FilterMode> {
        self.stages.iter().map(FilterStage::mode).collect()
    }

    pub fn code(&self) -> FilterChainCode {
        FilterChainCode::from_modes(&self.modes())
    }

    pub fn decimation(&self) -> u32 {
        1 << self.stages.len()
    }

    /// Push one sample through the cascade. A stage only hands a sample on
    /// when it produced one, so at most one output comes out per input.
    #[inline]
    pub fn work(&mut self, sample: Sample) -> Option<Sample> {
        let mut s = sample;
        for stage in self.stages.iter_mut() {
            s = stage.work(s)?;
        }
        Some(s)
    }

    /// Run a whole run of samples, appending outputs to `out`
    pub fn process(&mut self, samples: &[Sample], out: &mut Vec<Sample>) {
        out.extend(samples.iter().filter_map(|&s| self.work(s)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use FilterMode::*;

    #[test]
    fn test_upper_half_500k_scenario() {
        let plan = synthesize(2_000_000, 250_000, 500_000, MAX_FILTER_STAGES).unwrap();
        assert_eq!(plan.log2_decim(), 3);
        assert_eq!(plan.modes, vec![UpperHalf, Center, Center]);
        assert_relative_eq!(plan.frequency_offset, 500_000.0);
        assert_relative_eq!(plan.residual_offset, 0.0);
    }

    #[test]
    fn test_centered_request_stays_centered() {
        let plan = synthesize(1_000_000, 125_000, 0, MAX_FILTER_STAGES).unwrap();
        assert_eq!(plan.modes, vec![Center, Center, Center]);
        assert_eq!(plan.code(), FilterChainCode::centered(3));
    }

    #[test]
    fn test_full_band_needs_no_stage() {
        let plan = synthesize(48_000, 48_000, 0, MAX_FILTER_STAGES).unwrap();
        assert!(plan.modes.is_empty());
        assert_relative_eq!(plan.frequency_offset, 0.0);
    }

    #[test]
    fn test_lower_edge() {
        let plan = synthesize(2_000_000, 500_000, -750_000, MAX_FILTER_STAGES).unwrap();
        assert_eq!(plan.modes, vec![LowerHalf, LowerHalf]);
        assert_relative_eq!(plan.frequency_offset, -750_000.0);
    }

    #[test]
    fn test_residual_left_for_nco() {
        let plan = synthesize(2_000_000, 100_000, 30_000, MAX_FILTER_STAGES).unwrap();
        // The chain output must still contain the whole request
        let out_rate = 2_000_000.0 / (1u32 << plan.log2_decim()) as f64;
        assert!(out_rate >= 100_000.0);
        assert!(out_rate < 200_000.0 * 2.0);
        assert!(plan.residual_offset.abs() + 50_000.0 <= out_rate / 2.0 + 1e-6);
        assert_relative_eq!(plan.frequency_offset + plan.residual_offset, 30_000.0);
    }

    #[test]
    fn test_stage_limit() {
        let plan = synthesize(1 << 20, 1, 0, 4).unwrap();
        assert_eq!(plan.log2_decim(), 4);
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            synthesize(1_000_000, 2_000_000, 0, MAX_FILTER_STAGES),
            Err(Error::RateExceedsBaseband {
                requested: 2_000_000,
                baseband: 1_000_000
            })
        );
        assert_eq!(synthesize(1_000_000, 0, 0, MAX_FILTER_STAGES), Err(Error::ZeroSampleRate));
        assert!(matches!(
            synthesize(2_000_000, 250_000, 1_200_000, MAX_FILTER_STAGES),
            Err(Error::OffsetOutOfBand { .. })
        ));
    }

    #[test]
    fn test_idempotent() {
        let a = synthesize(3_000_000, 48_000, -412_345, MAX_FILTER_STAGES).unwrap();
        let b = synthesize(3_000_000, 48_000, -412_345, MAX_FILTER_STAGES).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_code_roundtrip_reproduces_offset() {
        for (fc, df) in [(250_000, 500_000), (48_000, -412_345), (10_000, 990_000), (1_000, 0)] {
            let plan = synthesize(2_000_000, fc, df, MAX_FILTER_STAGES).unwrap();
            let stages = plan.log2_decim();
            let modes = plan.code().to_modes(stages).unwrap();
            assert_eq!(modes, plan.modes);
            let offset = 2_000_000.0 * plan.code().shift_factor(stages).unwrap();
            assert_relative_eq!(offset, plan.frequency_offset, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_code_digit_order() {
        // First stage is the most significant trit
        assert_eq!(FilterChainCode::from_modes(&[UpperHalf, Center, Center]).0, 2 * 9 + 3 + 1);
        assert_eq!(
            FilterChainCode(0).to_modes(2).unwrap(),
            vec![LowerHalf, LowerHalf]
        );
        assert!(FilterChainCode::from_modes(&[]).to_modes(0).unwrap().is_empty());
    }

    #[test]
    fn test_code_validation() {
        assert_eq!(
            FilterChainCode(27).to_modes(3),
            Err(Error::InvalidChainCode { code: 27, stages: 3 })
        );
        assert!(FilterChainCode(26).to_modes(3).is_ok());
        assert_eq!(FilterChainCode(27).clamped(3), FilterChainCode(26));
        assert_eq!(FilterChainCode(5).clamped(3), FilterChainCode(5));
        assert!(matches!(
            FilterChainCode(0).to_modes(MAX_FILTER_STAGES + 1),
            Err(Error::TooManyStages { .. })
        ));
    }

    #[test]
    fn test_deep_codes_stay_in_range() {
        let limit = FilterChainCode::max_for(MAX_FILTER_STAGES);
        assert_eq!(FilterChainCode::max_for(25), limit);
        assert_eq!(FilterChainCode::centered(32), FilterChainCode(limit / 2));
        assert_eq!(FilterChainCode(u32::MAX).clamped(40), FilterChainCode(limit));
        assert_eq!(
            FilterChainCode::centered(25).to_modes(25),
            Err(Error::TooManyStages {
                stages: 25,
                max: MAX_FILTER_STAGES
            })
        );
    }

    #[test]
    fn test_shift_factor() {
        assert_relative_eq!(shift_factor(&[UpperHalf]), 0.25);
        assert_relative_eq!(shift_factor(&[UpperHalf, UpperHalf]), 0.375);
        assert_relative_eq!(shift_factor(&[LowerHalf, UpperHalf, Center]), -0.125);
    }

    #[test]
    fn test_chain_decimates() {
        let mut chain = FilterChain::from_modes(&[Center, UpperHalf, LowerHalf]);
        assert_eq!(chain.decimation(), 8);
        let input = vec![Sample::new(1.0, 0.0); 800];
        let mut out = Vec::new();
        chain.process(&input, &mut out);
        assert_eq!(out.len(), 100);
        assert_eq!(chain.code(), FilterChainCode::from_modes(&[Center, UpperHalf, LowerHalf]));
    }
}
