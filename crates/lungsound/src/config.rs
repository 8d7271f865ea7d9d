//! Typed configuration file (`config.json`) parsing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    AUDIO_DURATION_SECS, CONFIDENCE_THRESHOLD, DISEASE_CLASSES, HOP_LENGTH, MEL_BINS,
    MEL_TIME_STEPS, MFCC_SEQUENCE_FRAMES, N_FFT, N_MFCC, SAMPLE_RATE_HZ,
};
use crate::features::FeatureKind;
use crate::scorer::ModelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub duration_secs: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            duration_secs: AUDIO_DURATION_SECS,
        }
    }
}

impl AudioConfig {
    #[must_use]
    pub fn normalized_len(&self) -> usize {
        (self.sample_rate_hz as usize) * (self.duration_secs as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    pub mfcc_frames: usize,
    pub mel_time_steps: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_fft: N_FFT,
            hop_length: HOP_LENGTH,
            n_mels: MEL_BINS,
            n_mfcc: N_MFCC,
            mfcc_frames: MFCC_SEQUENCE_FRAMES,
            mel_time_steps: MEL_TIME_STEPS,
        }
    }
}

impl FeatureConfig {
    /// Tensor shape produced by the `kind` transform under this configuration.
    #[must_use]
    pub fn shape_of(&self, kind: FeatureKind) -> Vec<usize> {
        match kind {
            FeatureKind::MfccStats => vec![4 * self.n_mfcc],
            FeatureKind::MfccSequence => vec![self.mfcc_frames, self.n_mfcc],
            FeatureKind::MelSpectrogram => vec![self.n_mels, self.mel_time_steps, 1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum top-class probability for a result to count as reliable.
    pub confidence: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            confidence: CONFIDENCE_THRESHOLD,
        }
    }
}

/// Ranges sampled by [`crate::augment::Augmenter`]; each pair is `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub noise_amplitude: (f32, f32),
    pub pitch_shift_semitones: (f32, f32),
    pub time_stretch_rate: (f32, f32),
    /// Perturbed copies produced per input clip.
    pub augmentation_factor: usize,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            noise_amplitude: (0.001, 0.015),
            pitch_shift_semitones: (-1.5, 1.5),
            time_stretch_rate: (0.9, 1.1),
            augmentation_factor: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub kind: ModelKind,
    /// Artifact path, relative to the model directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LungConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    #[serde(default)]
    pub augmentation: AugmentationConfig,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

fn default_class_names() -> Vec<String> {
    DISEASE_CLASSES.iter().map(|s| (*s).to_string()).collect()
}

impl Default for LungConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            features: FeatureConfig::default(),
            thresholds: ThresholdConfig::default(),
            class_names: default_class_names(),
            augmentation: AugmentationConfig::default(),
            models: Vec::new(),
        }
    }
}

impl LungConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("parse config.json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let json = std::fs::read_to_string(path_ref)
            .with_context(|| format!("read {}", path_ref.display()))?;
        Self::from_json_str(&json)
    }

    pub fn model(&self, id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        let feat = &self.features;
        let aug = &self.augmentation;

        anyhow::ensure!(audio.sample_rate_hz > 0, "sample_rate_hz must be > 0");
        anyhow::ensure!(audio.duration_secs > 0, "duration_secs must be > 0");
        anyhow::ensure!(feat.hop_length > 0, "hop_length must be > 0");
        anyhow::ensure!(
            feat.n_fft % 2 == 0,
            "n_fft must be even, got {}",
            feat.n_fft
        );
        anyhow::ensure!(
            feat.n_fft >= feat.hop_length,
            "n_fft ({}) must be >= hop_length ({})",
            feat.n_fft,
            feat.hop_length
        );
        anyhow::ensure!(feat.n_mels > 0, "n_mels must be > 0");
        anyhow::ensure!(
            feat.n_mfcc > 0 && feat.n_mfcc <= feat.n_mels,
            "n_mfcc must be in 1..=n_mels"
        );
        anyhow::ensure!(feat.mfcc_frames > 0, "mfcc_frames must be > 0");
        anyhow::ensure!(feat.mel_time_steps > 0, "mel_time_steps must be > 0");

        let t = self.thresholds.confidence;
        anyhow::ensure!(
            (0.0..=1.0).contains(&t),
            "confidence threshold must be within [0, 1], got {t}"
        );

        anyhow::ensure!(!self.class_names.is_empty(), "class_names must not be empty");
        let mut seen = HashSet::new();
        for name in &self.class_names {
            anyhow::ensure!(!name.trim().is_empty(), "class names must not be blank");
            anyhow::ensure!(seen.insert(name.as_str()), "duplicate class name {name:?}");
        }

        let mut ids = HashSet::new();
        for m in &self.models {
            anyhow::ensure!(!m.id.is_empty(), "model id must not be empty");
            anyhow::ensure!(ids.insert(m.id.as_str()), "duplicate model id {:?}", m.id);
        }

        for (name, (lo, hi)) in [
            ("noise_amplitude", aug.noise_amplitude),
            ("pitch_shift_semitones", aug.pitch_shift_semitones),
            ("time_stretch_rate", aug.time_stretch_rate),
        ] {
            anyhow::ensure!(lo <= hi, "{name} range is inverted: ({lo}, {hi})");
        }
        anyhow::ensure!(aug.noise_amplitude.0 >= 0.0, "noise_amplitude must be >= 0");
        anyhow::ensure!(aug.time_stretch_rate.0 > 0.0, "time_stretch_rate must be > 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LungConfig;
    use crate::scorer::ModelKind;

    #[test]
    fn parse_config_smoke() {
        let json = r#"
        {
          "thresholds": { "confidence": 0.7 },
          "class_names": ["Healthy", "COPD", "Pneumonia"],
          "models": [
            { "id": "rf", "kind": "random_forest", "path": "rf.safetensors" },
            { "id": "cnn2d", "kind": "cnn2d", "path": "cnn2d.safetensors" }
          ]
        }
        "#;
        let c = LungConfig::from_json_str(json).expect("config parse");
        assert_eq!(c.audio.sample_rate_hz, 22_050);
        assert_eq!(c.audio.normalized_len(), 88_200);
        assert_eq!(c.features.n_mfcc, 13);
        assert!((c.thresholds.confidence - 0.7).abs() < 1e-6);
        assert_eq!(c.class_names.len(), 3);
        assert_eq!(c.model("cnn2d").map(|m| m.kind), Some(ModelKind::Cnn2d));
        assert_eq!(c.augmentation.augmentation_factor, 3);
    }

    #[test]
    fn empty_object_uses_canonical_defaults() {
        let c = LungConfig::from_json_str("{}").expect("config parse");
        assert_eq!(c, LungConfig::default());
        assert_eq!(c.class_names[2], "Asthma");
        assert_eq!(c.class_names[5], "LRTI");
    }

    #[test]
    fn validation_rejects_bad_values() {
        for json in [
            r#"{ "thresholds": { "confidence": 1.5 } }"#,
            r#"{ "class_names": [] }"#,
            r#"{ "class_names": ["COPD", "COPD"] }"#,
            r#"{ "features": { "n_mfcc": 200 } }"#,
            r#"{ "features": { "n_fft": 256, "hop_length": 512 } }"#,
            r#"{ "augmentation": { "time_stretch_rate": [1.1, 0.9] } }"#,
            r#"{ "models": [
                 { "id": "a", "kind": "svm", "path": "a" },
                 { "id": "a", "kind": "cnn1d", "path": "b" } ] }"#,
        ] {
            assert!(LungConfig::from_json_str(json).is_err(), "accepted: {json}");
        }
    }

    #[test]
    fn odd_fft_size_is_rejected() {
        let json = r#"{ "features": { "n_fft": 2047, "hop_length": 600 } }"#;
        let err = LungConfig::from_json_str(json).expect_err("odd n_fft");
        assert!(format!("{err:#}").contains("n_fft must be even"), "{err:#}");
    }
}
