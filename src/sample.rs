//! The I/Q value that flows through every stage of the pipeline

use num_complex::Complex;
use num_traits::ToPrimitive;

/// One complex baseband sample
pub type Sample = Complex<f32>;

/// Samples in signal time order, handed from one stage to the next
pub type SampleVector = Vec<Sample>;

/// Full-scale value of the 16 bit fixed point samples most device engines deliver
pub const FIXED_SCALE: f32 = 32768.0;

/// Build a sample from any numeric I/Q pair without rescaling
pub fn from_iq<T: ToPrimitive>(i: T, q: T) -> Sample {
    Sample::new(i.to_f32().unwrap_or(0.0), q.to_f32().unwrap_or(0.0))
}

/// Convert a 16 bit fixed point pair into a sample normalized to [-1, 1)
pub fn from_fixed(i: i16, q: i16) -> Sample {
    from_iq(i, q) / FIXED_SCALE
}

/// Convert back to 16 bit fixed point, saturating out of range values
pub fn to_fixed(sample: Sample) -> (i16, i16) {
    let scale = |x: f32| (x * FIXED_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    (scale(sample.re), scale(sample.im))
}

/// Mean power of a run of samples, 0 for an empty run
pub fn mean_power(samples: &[Sample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32
}
