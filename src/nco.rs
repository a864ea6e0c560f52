//! Numerically controlled oscillator for the fine tuning left after the
//! half-band chain.
//!
//! The chain can only move the spectrum by power-of-two fractions of the
//! baseband rate. Whatever offset remains (the channelizer's residual) is
//! removed downstream by mixing with a complex sinusoid.

use std::f64::consts::TAU;

use crate::sample::Sample;

#[derive(Debug, Clone)]
pub struct Nco {
    /// Phase in cycles, kept in [0, 1)
    phase: f64,
    /// Frequency in cycles per sample
    frequency: f64,
    frequency_hz: f64,
    sample_rate: f64,
}

impl Nco {
    pub fn new(frequency_hz: f64, sample_rate: f64) -> Self {
        let mut nco = Self {
            phase: 0.0,
            frequency: 0.0,
            frequency_hz: 0.0,
            sample_rate,
        };
        nco.set_frequency(frequency_hz, sample_rate);
        nco
    }

    /// Retune without resetting the phase, so the output stays continuous
    pub fn set_frequency(&mut self, frequency_hz: f64, sample_rate: f64) {
        self.frequency_hz = frequency_hz;
        self.sample_rate = sample_rate;
        self.frequency = if sample_rate > 0.0 {
            frequency_hz / sample_rate
        } else {
            0.0
        };
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Next sample of e^{-j 2 pi f n}
    #[inline]
    pub fn next_conj(&mut self) -> Sample {
        let angle = -TAU * self.phase;
        self.phase = (self.phase + self.frequency).rem_euclid(1.0);
        Sample::new(angle.cos() as f32, angle.sin() as f32)
    }

    /// Shift `frequency_hz` down to DC, in place
    pub fn mix(&mut self, samples: &mut [Sample]) {
        for s in samples.iter_mut() {
            *s *= self.next_conj();
        }
    }
}
