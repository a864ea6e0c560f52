//! Half-band decimate-by-2 FIR and the stage that places it in the spectrum
//!
//! A half-band low-pass has its cutoff at a quarter of the input rate, so every
//! even tap away from the center is zero and decimating by two after it aliases
//! nothing from the kept band. Before filtering, a stage may rotate the input by
//! a quarter of the input rate (multiplying by powers of `j`), which brings
//! either the lower or the upper half of the spectrum to the center. No
//! general-purpose mixer is needed.

use std::f64::consts::PI;

use crate::sample::Sample;

/// Filter order; the filter has `HB_FILTER_ORDER + 1` taps
pub const HB_FILTER_ORDER: usize = 32;
const TAPS: usize = HB_FILTER_ORDER + 1;
const MIDDLE: usize = HB_FILTER_ORDER / 2;
// Non-zero taps on one side of the center (odd offsets only)
const SIDE_TAPS: usize = HB_FILTER_ORDER / 4;

/// Which part of the input spectrum a stage keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Keep [-Fs/2, 0], re-centered on 0
    LowerHalf,
    /// Keep [-Fs/4, Fs/4]
    Center,
    /// Keep [0, Fs/2], re-centered on 0
    UpperHalf,
}

impl FilterMode {
    /// Base 3 digit used in filter chain codes
    pub fn trit(self) -> u32 {
        match self {
            FilterMode::LowerHalf => 0,
            FilterMode::Center => 1,
            FilterMode::UpperHalf => 2,
        }
    }

    pub fn from_trit(trit: u32) -> Option<Self> {
        match trit {
            0 => Some(FilterMode::LowerHalf),
            1 => Some(FilterMode::Center),
            2 => Some(FilterMode::UpperHalf),
            _ => None,
        }
    }

    /// Shift of the kept band's center, as a fraction of the stage input rate
    pub fn shift(self) -> f64 {
        (self.trit() as f64 - 1.0) / 4.0
    }
}

/// Odd-offset coefficients of a Blackman-windowed half-band sinc, scaled so
/// that together with the 0.5 center tap the DC gain is exactly one.
fn design_taps() -> [f32; SIDE_TAPS] {
    let mut taps = [0f64; SIDE_TAPS];
    for (k, tap) in taps.iter_mut().enumerate() {
        let offset = (2 * k + 1) as f64;
        let x = PI * offset / 2.0;
        let sinc = 0.5 * x.sin() / x;
        let n = MIDDLE as f64 + offset;
        let order = HB_FILTER_ORDER as f64;
        let window =
            0.42 - 0.5 * (2.0 * PI * n / order).cos() + 0.08 * (4.0 * PI * n / order).cos();
        *tap = sinc * window;
    }
    // Both sides together must contribute the other half of unity gain
    let sum: f64 = taps.iter().sum::<f64>() * 2.0;
    let mut out = [0f32; SIDE_TAPS];
    for (o, t) in out.iter_mut().zip(taps) {
        *o = (t * 0.5 / sum) as f32;
    }
    out
}

/// Decimate-by-2 half-band FIR on complex samples.
///
/// The delay line is stored twice back to back so the last `TAPS` samples are
/// always one contiguous slice, whatever the write position.
#[derive(Debug, Clone)]
pub struct HalfBandFilter {
    taps: [f32; SIDE_TAPS],
    line: Vec<Sample>,
    ptr: usize,
    phase: u8,
}

impl Default for HalfBandFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl HalfBandFilter {
    pub fn new() -> Self {
        Self {
            taps: design_taps(),
            line: vec![Sample::default(); 2 * TAPS],
            ptr: 0,
            phase: 0,
        }
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    pub fn reset(&mut self) {
        self.line.fill(Sample::default());
        self.ptr = 0;
        self.phase = 0;
    }

    /// Push one input sample, returning an output on every second call
    pub fn work(&mut self, sample: Sample, mode: FilterMode) -> Option<Sample> {
        let rotated = match mode {
            FilterMode::Center => sample,
            // multiply by j^n: shifts the spectrum up by Fs/4
            FilterMode::LowerHalf => match self.phase {
                0 => Sample::new(-sample.im, sample.re),
                1 => -sample,
                2 => Sample::new(sample.im, -sample.re),
                _ => sample,
            },
            // multiply by (-j)^n: shifts the spectrum down by Fs/4
            FilterMode::UpperHalf => match self.phase {
                0 => Sample::new(sample.im, -sample.re),
                1 => -sample,
                2 => Sample::new(-sample.im, sample.re),
                _ => sample,
            },
        };
        self.store(rotated);
        let produce = self.phase % 2 == 1;
        let out = if produce { Some(self.fir()) } else { None };
        self.ptr = (self.ptr + 1) % TAPS;
        self.phase = (self.phase + 1) % 4;
        out
    }

    fn store(&mut self, sample: Sample) {
        self.line[self.ptr] = sample;
        self.line[self.ptr + TAPS] = sample;
    }

    fn fir(&self) -> Sample {
        // Oldest first, newest at window[TAPS - 1]
        let window = &self.line[self.ptr + 1..=self.ptr + TAPS];
        let mut acc = window[MIDDLE] * 0.5;
        for (k, &tap) in self.taps.iter().enumerate() {
            let d = 2 * k + 1;
            acc += (window[MIDDLE - d] + window[MIDDLE + d]) * tap;
        }
        acc
    }
}

/// One link of the decimation cascade
#[derive(Debug, Clone)]
pub struct FilterStage {
    filter: HalfBandFilter,
    mode: FilterMode,
}

impl FilterStage {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            filter: HalfBandFilter::new(),
            mode,
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    #[inline]
    pub fn work(&mut self, sample: Sample) -> Option<Sample> {
        self.filter.work(sample, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(mode: FilterMode, input: impl Iterator<Item = Sample>) -> Vec<Sample> {
        let mut stage = FilterStage::new(mode);
        input.filter_map(|s| stage.work(s)).collect()
    }

    // e^{j 2 pi f n} with f in cycles per sample
    fn tone(cycles: f32, len: usize) -> impl Iterator<Item = Sample> {
        (0..len).map(move |n| Sample::from_polar(1.0, 2.0 * std::f32::consts::PI * cycles * n as f32))
    }

    #[test]
    fn test_unity_dc_gain() {
        let filter = HalfBandFilter::new();
        let sum: f32 = filter.taps().iter().sum::<f32>() * 2.0 + 0.5;
        assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_decimates_by_two() {
        let out = run(FilterMode::Center, tone(0.0, 1000));
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn test_center_passes_dc() {
        let out = run(FilterMode::Center, tone(0.0, 400));
        for s in &out[TAPS..] {
            assert_relative_eq!(s.re, 1.0, epsilon = 1e-4);
            assert_relative_eq!(s.im, 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_center_rejects_nyquist() {
        let out = run(FilterMode::Center, tone(0.5, 400));
        for s in &out[TAPS..] {
            assert!(s.norm() < 1e-2, "leak {}", s.norm());
        }
    }

    #[test]
    fn test_lower_half_brings_negative_quarter_to_dc() {
        let out = run(FilterMode::LowerHalf, tone(-0.25, 400));
        let first = out[TAPS];
        for s in &out[TAPS..] {
            assert_relative_eq!(s.norm(), 1.0, epsilon = 1e-3);
            // constant phase means the tone now sits at DC
            assert_relative_eq!((s / first).arg(), 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_upper_half_brings_positive_quarter_to_dc() {
        let out = run(FilterMode::UpperHalf, tone(0.25, 400));
        let first = out[TAPS];
        for s in &out[TAPS..] {
            assert_relative_eq!(s.norm(), 1.0, epsilon = 1e-3);
            assert_relative_eq!((s / first).arg(), 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_upper_half_rejects_lower_half() {
        let out = run(FilterMode::UpperHalf, tone(-0.25, 400));
        for s in &out[TAPS..] {
            assert!(s.norm() < 1e-2);
        }
    }

    #[test]
    fn test_mode_trits() {
        for trit in 0..3 {
            assert_eq!(FilterMode::from_trit(trit).map(FilterMode::trit), Some(trit));
        }
        assert_eq!(FilterMode::from_trit(3), None);
        assert_relative_eq!(FilterMode::UpperHalf.shift(), 0.25);
        assert_relative_eq!(FilterMode::LowerHalf.shift(), -0.25);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = HalfBandFilter::new();
        for _ in 0..10 {
            filter.work(Sample::new(1.0, 1.0), FilterMode::Center);
        }
        filter.reset();
        assert_eq!(filter.work(Sample::default(), FilterMode::Center), None);
        assert_eq!(filter.work(Sample::default(), FilterMode::Center), Some(Sample::default()));
    }
}
