//! Audio-to-tensor transforms consumed by the classifiers.
//!
//! All three extractors share one STFT framing (`n_fft`, `hop_length`) so feature
//! distributions stay comparable between models.

use serde::{Deserialize, Serialize};

use crate::audio::{AudioSignal, normalize_duration};
use crate::config::{AudioConfig, FeatureConfig};
use crate::mel::{MelConfig, MelSpectrogram};
use crate::mfcc::{Mfcc, MfccExtractor};
use crate::{LungError, Result};

/// Which transform a classifier consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    /// `[4 * n_mfcc]` mean/std/min/max summary.
    MfccStats,
    /// `[mfcc_frames, n_mfcc]` time-major frames.
    MfccSequence,
    /// `[n_mels, mel_time_steps, 1]` dB image.
    MelSpectrogram,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 3] = [
        FeatureKind::MfccStats,
        FeatureKind::MfccSequence,
        FeatureKind::MelSpectrogram,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MfccStats => "mfcc-stats",
            Self::MfccSequence => "mfcc-sequence",
            Self::MelSpectrogram => "mel",
        }
    }
}

impl std::str::FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mfcc-stats" => Ok(Self::MfccStats),
            "mfcc-sequence" => Ok(Self::MfccSequence),
            "mel" | "mel-spectrogram" => Ok(Self::MelSpectrogram),
            other => Err(format!("unknown feature kind: {other}")),
        }
    }
}

/// Dense row-major feature tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl FeatureTensor {
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }
}

/// Concatenate per-coefficient mean, population std, min and max.
fn mfcc_statistics(mfcc: &Mfcc) -> Vec<f32> {
    let n = mfcc.n_mfcc;
    let mut out = vec![0.0f32; 4 * n];
    if mfcc.n_frames == 0 {
        return out;
    }
    let frames = mfcc.n_frames as f64;

    for c in 0..n {
        let mut sum = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for v in mfcc.coefficient(c) {
            sum += f64::from(v);
            min = min.min(v);
            max = max.max(v);
        }
        let mean = sum / frames;
        let var = mfcc
            .coefficient(c)
            .map(|v| {
                let d = f64::from(v) - mean;
                d * d
            })
            .sum::<f64>()
            / frames;

        out[c] = mean as f32;
        out[n + c] = var.sqrt() as f32;
        out[2 * n + c] = min;
        out[3 * n + c] = max;
    }
    out
}

/// Copy the leading `max_frames` frames of a frame-major matrix, zero-padding the tail.
fn fit_frames(data: &[f32], n_frames: usize, width: usize, max_frames: usize) -> Vec<f32> {
    let keep = n_frames.min(max_frames);
    let mut out = vec![0.0f32; max_frames * width];
    out[..keep * width].copy_from_slice(&data[..keep * width]);
    out
}

/// Precomputed extractors for one audio/feature configuration.
///
/// Immutable after construction; share one instance across requests.
#[derive(Debug)]
pub struct FeatureExtractor {
    audio: AudioConfig,
    features: FeatureConfig,
    mfcc: MfccExtractor,
    mel: MelSpectrogram,
}

impl FeatureExtractor {
    #[must_use]
    pub fn new(audio: AudioConfig, features: FeatureConfig) -> Self {
        let mel_config = MelConfig {
            sample_rate_hz: audio.sample_rate_hz,
            n_fft: features.n_fft,
            hop_length: features.hop_length,
            n_mels: features.n_mels,
            fmin: 0.0,
            fmax: None,
        };
        Self {
            audio,
            features,
            mfcc: MfccExtractor::new(mel_config, features.n_mfcc),
            mel: MelSpectrogram::new(mel_config),
        }
    }

    #[must_use]
    pub fn audio_config(&self) -> &AudioConfig {
        &self.audio
    }

    #[must_use]
    pub fn feature_config(&self) -> &FeatureConfig {
        &self.features
    }

    /// Resample a decoded signal to the configured rate and fix its duration.
    pub fn normalize(&self, signal: &AudioSignal) -> Result<Vec<f32>> {
        if signal.sample_rate_hz == 0 {
            return Err(LungError::Decode("sample rate must be positive".into()));
        }
        let rate = self.audio.sample_rate_hz;
        Ok(if signal.sample_rate_hz == rate {
            normalize_duration(&signal.samples, rate, self.audio.duration_secs)
        } else {
            let resampled = signal.resampled(rate);
            normalize_duration(&resampled.samples, rate, self.audio.duration_secs)
        })
    }

    #[must_use]
    pub fn expected_shape(&self, kind: FeatureKind) -> Vec<usize> {
        self.features.shape_of(kind)
    }

    /// Run the transform for `kind` over an already-normalized signal.
    #[must_use]
    pub fn extract(&self, kind: FeatureKind, normalized: &[f32]) -> FeatureTensor {
        match kind {
            FeatureKind::MfccStats => self.mfcc_stats(normalized),
            FeatureKind::MfccSequence => self.mfcc_sequence(normalized),
            FeatureKind::MelSpectrogram => self.mel_spectrogram(normalized),
        }
    }

    /// `[13 means, 13 stds, 13 mins, 13 maxs]` for the default configuration.
    #[must_use]
    pub fn mfcc_stats(&self, normalized: &[f32]) -> FeatureTensor {
        let mfcc = self.mfcc.compute(normalized);
        let stats = mfcc_statistics(&mfcc);
        FeatureTensor::new(vec![stats.len()], stats)
    }

    #[must_use]
    pub fn mfcc_sequence(&self, normalized: &[f32]) -> FeatureTensor {
        let mfcc = self.mfcc.compute(normalized);
        let max_frames = self.features.mfcc_frames;
        let data = fit_frames(&mfcc.data, mfcc.n_frames, mfcc.n_mfcc, max_frames);
        FeatureTensor::new(vec![max_frames, mfcc.n_mfcc], data)
    }

    /// Mel bands by time steps, in dB relative to the clip's own peak power.
    #[must_use]
    pub fn mel_spectrogram(&self, normalized: &[f32]) -> FeatureTensor {
        let mut mel = self.mel.compute(normalized);
        mel.to_db_ref_max();

        let n_mels = mel.n_mels;
        let n_time = self.features.mel_time_steps;
        let keep = mel.n_frames.min(n_time);

        let mut data = vec![0.0f32; n_mels * n_time];
        for t in 0..keep {
            for (m, &v) in mel.frame(t).iter().enumerate() {
                data[m * n_time + t] = v;
            }
        }
        FeatureTensor::new(vec![n_mels, n_time, 1], data)
    }

    /// Mel image for an in-memory (possibly perturbed) signal, bypassing file decoding.
    pub fn mel_spectrogram_from_signal(&self, signal: &AudioSignal) -> Result<FeatureTensor> {
        Ok(self.mel_spectrogram(&self.normalize(signal)?))
    }
}

fn default_extractor(sample_rate_hz: u32, features: FeatureConfig) -> FeatureExtractor {
    let audio = AudioConfig {
        sample_rate_hz,
        ..AudioConfig::default()
    };
    FeatureExtractor::new(audio, features)
}

/// One-shot MFCC statistics with default framing.
#[must_use]
pub fn extract_mfcc_stats(signal: &[f32], sample_rate_hz: u32, n_mfcc: usize) -> FeatureTensor {
    let features = FeatureConfig {
        n_mfcc,
        ..FeatureConfig::default()
    };
    default_extractor(sample_rate_hz, features).mfcc_stats(signal)
}

/// One-shot MFCC sequence with default framing.
#[must_use]
pub fn extract_mfcc_sequence(
    signal: &[f32],
    sample_rate_hz: u32,
    n_mfcc: usize,
    max_frames: usize,
) -> FeatureTensor {
    let features = FeatureConfig {
        n_mfcc,
        mfcc_frames: max_frames,
        ..FeatureConfig::default()
    };
    default_extractor(sample_rate_hz, features).mfcc_sequence(signal)
}

/// One-shot mel-spectrogram image with default framing.
#[must_use]
pub fn extract_mel_spectrogram(
    signal: &[f32],
    sample_rate_hz: u32,
    n_mels: usize,
    n_time_steps: usize,
) -> FeatureTensor {
    let features = FeatureConfig {
        n_mels,
        mel_time_steps: n_time_steps,
        ..FeatureConfig::default()
    };
    default_extractor(sample_rate_hz, features).mel_spectrogram(signal)
}
