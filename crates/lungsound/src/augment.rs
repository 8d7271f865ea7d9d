//! Seeded waveform perturbations for training-set expansion.
//!
//! Each perturbation draws its parameter uniformly from the matching
//! [`AugmentationConfig`] range. The random source is a 64-bit LCG so a given
//! seed always yields the same variants.

use std::f32::consts::PI;

use rustfft::num_complex::Complex;

use crate::audio::{AudioSignal, resample_to_len};
use crate::config::AugmentationConfig;
use crate::constants::{HOP_LENGTH, N_FFT};
use crate::stft::{Spectrum, Stft};

#[derive(Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    stft: Stft,
    state: u64,
}

impl Augmenter {
    #[must_use]
    pub fn new(config: AugmentationConfig, seed: u64) -> Self {
        Self {
            config,
            stft: Stft::new(N_FFT, HOP_LENGTH),
            state: seed,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Uniform in `[0, 1)`.
    fn next_unit(&mut self) -> f32 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.state >> 40) as f32) / ((1u64 << 24) as f32)
    }

    fn uniform(&mut self, (lo, hi): (f32, f32)) -> f32 {
        lo + (hi - lo) * self.next_unit()
    }

    /// Add uniform noise in `[-amplitude, amplitude]`.
    pub fn add_noise(&mut self, samples: &[f32], amplitude: f32) -> Vec<f32> {
        samples
            .iter()
            .map(|&x| x + amplitude * (2.0 * self.next_unit() - 1.0))
            .collect()
    }

    /// Phase-vocoder time stretch; `rate > 1` speeds up.
    ///
    /// Output length is `round(len / rate)`; pitch is preserved.
    #[must_use]
    pub fn time_stretch(&self, samples: &[f32], rate: f32) -> Vec<f32> {
        if samples.is_empty() || rate <= 0.0 || (rate - 1.0).abs() < f32::EPSILON {
            return samples.to_vec();
        }
        let out_len = (samples.len() as f64 / f64::from(rate)).round() as usize;
        let spec = self.stft.forward(samples);
        let stretched = phase_vocoder(&spec, rate, self.stft.hop_length(), self.stft.n_fft());
        self.stft.inverse(&stretched, out_len)
    }

    /// Shift pitch by `semitones` while keeping the input length.
    #[must_use]
    pub fn pitch_shift(&self, samples: &[f32], semitones: f32) -> Vec<f32> {
        if semitones == 0.0 {
            return samples.to_vec();
        }
        let rate = 2.0f32.powf(-semitones / 12.0);
        let stretched = self.time_stretch(samples, rate);
        resample_to_len(&stretched, samples.len())
    }

    /// One random variant: time stretch, then pitch shift, then additive noise.
    pub fn augment(&mut self, signal: &AudioSignal) -> AudioSignal {
        let rate = self.uniform(self.config.time_stretch_rate);
        let semitones = self.uniform(self.config.pitch_shift_semitones);
        let amplitude = self.uniform(self.config.noise_amplitude);
        tracing::debug!(rate, semitones, amplitude, "augmenting clip");

        let stretched = self.time_stretch(&signal.samples, rate);
        let shifted = self.pitch_shift(&stretched, semitones);
        AudioSignal::new(self.add_noise(&shifted, amplitude), signal.sample_rate_hz)
    }

    /// `augmentation_factor` independent variants of `signal`.
    pub fn variants(&mut self, signal: &AudioSignal) -> Vec<AudioSignal> {
        (0..self.config.augmentation_factor)
            .map(|_| self.augment(signal))
            .collect()
    }
}

/// Resample STFT columns at fractional steps of `rate`, accumulating phase.
fn phase_vocoder(spec: &Spectrum, rate: f32, hop_length: usize, n_fft: usize) -> Spectrum {
    let n_freq = spec.n_freq;
    let n_in = spec.n_frames;
    let n_out = ((n_in as f64) / f64::from(rate)).ceil() as usize;

    // Expected phase advance per hop for each bin.
    let advance: Vec<f32> = (0..n_freq)
        .map(|k| 2.0 * PI * (hop_length as f32) * (k as f32) / (n_fft as f32))
        .collect();

    let zero = Complex::new(0.0f32, 0.0);
    let column = |t: usize, k: usize| {
        if t < n_in {
            spec.bins[t * n_freq + k]
        } else {
            zero
        }
    };

    let mut phase: Vec<f32> = (0..n_freq).map(|k| column(0, k).arg()).collect();
    let mut bins = Vec::with_capacity(n_out * n_freq);

    for t in 0..n_out {
        let step = t as f64 * f64::from(rate);
        let base = step.floor() as usize;
        let alpha = (step - base as f64) as f32;
        for k in 0..n_freq {
            let a = column(base, k);
            let b = column(base + 1, k);
            let mag = (1.0 - alpha) * a.norm() + alpha * b.norm();
            bins.push(Complex::from_polar(mag, phase[k]));

            let mut dphase = b.arg() - a.arg() - advance[k];
            dphase -= 2.0 * PI * (dphase / (2.0 * PI)).round();
            phase[k] += advance[k] + dphase;
        }
    }

    Spectrum {
        bins,
        n_frames: n_out,
        n_freq,
    }
}
