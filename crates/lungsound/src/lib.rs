//! Lung-condition prediction from breathing-sound recordings.
//!
//! This crate provides:
//! - Audio frontend (WAV decode, resample, fixed-duration normalization)
//! - Feature extraction (MFCC statistics, MFCC sequences, dB mel-spectrograms)
//! - Model scoring (random forest, SVM, 1D/2D CNN adapters over safetensors artifacts)
//! - Ensemble combination and user-facing result formatting

pub mod audio;
pub mod augment;
pub mod cnn;
pub mod config;
pub mod constants;
pub mod conv;
pub mod ensemble;
pub mod features;
pub mod forest;
pub mod math;
pub mod mel;
pub mod mfcc;
pub mod model;
pub mod ops;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod scorer;
pub mod stft;
pub mod svm;
pub mod weights;

pub use audio::AudioSignal;
pub use features::{FeatureExtractor, FeatureKind, FeatureTensor};
pub use pipeline::{ModelSelection, Predictor};
pub use report::{ConfidenceLevel, PredictionResult};
pub use scorer::{ModelKind, ModelScorer, ScorerOutput};

/// Failures surfaced by the prediction core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LungError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("shape mismatch for {model}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        model: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },
    #[error("model {model} could not score the input: {reason}")]
    Scoring { model: String, reason: String },
    #[error("label mismatch: {expected} class names, {got} probabilities")]
    LabelMismatch { expected: usize, got: usize },
    #[error("ensemble needs at least one probability vector")]
    EmptyEnsemble,
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("no models available for prediction")]
    NoModelsAvailable,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LungError {
    /// Stable tag for API layers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::ModelLoad { .. } => "model_load",
            Self::Scoring { .. } => "scoring",
            Self::LabelMismatch { .. } => "label_mismatch",
            Self::EmptyEnsemble => "empty_ensemble",
            Self::UnknownModel(_) => "unknown_model",
            Self::NoModelsAvailable => "no_models_available",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T, E = LungError> = std::result::Result<T, E>;
