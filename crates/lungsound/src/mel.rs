//! Mel power spectrogram (librosa-compatible).
//!
//! Matches `librosa.feature.melspectrogram` defaults:
//! - centered frames with `n_fft/2` zero padding on both sides
//! - periodic Hann window
//! - power spectrum (`|X|^2`)
//! - Slaney mel scale with Slaney area normalization
//!
//! `power_to_db` follows `librosa.power_to_db` (amin clamp, reference, top_db floor).

use crate::constants::{
    HOP_LENGTH, MEL_BINS, N_FFT, POWER_DB_AMIN, POWER_DB_TOP_DB, SAMPLE_RATE_HZ,
};
use crate::stft::Stft;

#[inline]
fn hertz_to_mel(freq: f32) -> f32 {
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = 15.0;
    // Precomputed: ln(6.4)/27.
    const LOGSTEP: f32 = 0.068_751_78;

    let mut mels = 3.0 * freq / 200.0;
    if freq >= MIN_LOG_HZ {
        mels = MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / LOGSTEP;
    }
    mels
}

#[inline]
fn mel_to_hertz(mels: f32) -> f32 {
    const MIN_LOG_HZ: f32 = 1000.0;
    const MIN_LOG_MEL: f32 = 15.0;
    const LOGSTEP: f32 = 0.068_751_78;

    let mut freq = 200.0 * mels / 3.0;
    if mels >= MIN_LOG_MEL {
        freq = MIN_LOG_HZ * (LOGSTEP * (mels - MIN_LOG_MEL)).exp();
    }
    freq
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelConfig {
    pub sample_rate_hz: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    /// Defaults to Nyquist.
    pub fmax: Option<f32>,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            n_fft: N_FFT,
            hop_length: HOP_LENGTH,
            n_mels: MEL_BINS,
            fmin: 0.0,
            fmax: None,
        }
    }
}

impl MelConfig {
    #[must_use]
    pub fn n_freq(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frame count of a centered STFT over `n_samples`.
    #[must_use]
    pub fn n_frames(&self, n_samples: usize) -> usize {
        1 + n_samples / self.hop_length
    }
}

/// Slaney-normalized triangular filters, row-major `[n_mels, n_freq]`.
fn build_mel_filters(cfg: &MelConfig) -> Vec<f32> {
    let n_freq = cfg.n_freq();
    let n_mels = cfg.n_mels;
    let sr = cfg.sample_rate_hz as f32;
    let fmax = cfg.fmax.unwrap_or(sr / 2.0);

    let fft_freqs: Vec<f32> = (0..n_freq)
        .map(|f| (f as f32) * sr / (cfg.n_fft as f32))
        .collect();

    let mel_min = hertz_to_mel(cfg.fmin);
    let mel_max = hertz_to_mel(fmax);

    let filter_freqs: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hertz(mel_min + (mel_max - mel_min) * (i as f32) / ((n_mels + 1) as f32)))
        .collect();

    let filter_diff: Vec<f32> = filter_freqs
        .windows(2)
        .map(|w| {
            let d = w[1] - w[0];
            if d == 0.0 { 1e-6 } else { d }
        })
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freq];
    for m in 0..n_mels {
        let enorm = 2.0 / (filter_freqs[m + 2] - filter_freqs[m]);
        let row = &mut filters[m * n_freq..(m + 1) * n_freq];
        for (f, out) in row.iter_mut().enumerate() {
            let down = (fft_freqs[f] - filter_freqs[m]) / filter_diff[m];
            let up = (filter_freqs[m + 2] - fft_freqs[f]) / filter_diff[m + 1];
            *out = down.min(up).max(0.0) * enorm;
        }
    }

    filters
}

/// Frame-major mel energies: `data[t * n_mels + m]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFrames {
    pub data: Vec<f32>,
    pub n_frames: usize,
    pub n_mels: usize,
}

impl MelFrames {
    #[must_use]
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.data[t * self.n_mels..(t + 1) * self.n_mels]
    }

    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Convert power to dB relative to a fixed reference (`ref=1.0` in librosa terms).
    pub fn to_db(&mut self, reference: f32) {
        power_to_db(&mut self.data, reference, POWER_DB_AMIN, Some(POWER_DB_TOP_DB));
    }

    /// Convert power to dB relative to this spectrogram's own maximum (`ref=np.max`).
    pub fn to_db_ref_max(&mut self) {
        let reference = self.max_value();
        self.to_db(reference);
    }
}

/// In-place `10*log10(max(amin, S)) - 10*log10(max(amin, ref))`, floored at `max - top_db`.
pub fn power_to_db(values: &mut [f32], reference: f32, amin: f32, top_db: Option<f32>) {
    let ref_db = 10.0 * reference.abs().max(amin).log10();
    let mut peak = f32::NEG_INFINITY;
    for v in values.iter_mut() {
        *v = 10.0 * v.max(amin).log10() - ref_db;
        peak = peak.max(*v);
    }
    if let Some(top_db) = top_db {
        let floor = peak - top_db;
        for v in values.iter_mut() {
            if *v < floor {
                *v = floor;
            }
        }
    }
}

/// Mel spectrogram extractor with precomputed filters and STFT plan.
///
/// Immutable after construction; safe to share across threads.
#[derive(Debug)]
pub struct MelSpectrogram {
    config: MelConfig,
    filters: Vec<f32>, // [n_mels * n_freq]
    stft: Stft,
}

impl MelSpectrogram {
    #[must_use]
    pub fn new(config: MelConfig) -> Self {
        Self {
            filters: build_mel_filters(&config),
            stft: Stft::new(config.n_fft, config.hop_length),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    /// Mel power spectrogram (no dB conversion).
    #[must_use]
    pub fn compute(&self, samples: &[f32]) -> MelFrames {
        let n_freq = self.config.n_freq();
        let n_mels = self.config.n_mels;
        let n_frames = self.stft.n_frames(samples.len());

        let mut power = vec![0.0f32; n_freq];
        let mut data = vec![0.0f32; n_frames * n_mels];
        self.stft.for_each_frame(samples, |t, spec| {
            for (p, c) in power.iter_mut().zip(spec) {
                *p = c.norm_sqr();
            }
            let out = &mut data[t * n_mels..(t + 1) * n_mels];
            for (m, out_m) in out.iter_mut().enumerate() {
                let filt = &self.filters[m * n_freq..(m + 1) * n_freq];
                *out_m = filt.iter().zip(&power).map(|(f, p)| f * p).sum();
            }
        });

        MelFrames {
            data,
            n_frames,
            n_mels,
        }
    }
}
