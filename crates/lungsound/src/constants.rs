//! Signal-processing and classification constants.

// Audio normalization.
pub const SAMPLE_RATE_HZ: u32 = 22_050;
pub const AUDIO_DURATION_SECS: u32 = 4;
pub const NORMALIZED_LEN: usize = (SAMPLE_RATE_HZ * AUDIO_DURATION_SECS) as usize; // 88200

// Shared STFT framing for every extractor.
pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const N_FREQ: usize = N_FFT / 2 + 1; // 1025
pub const MEL_BINS: usize = 128;

// MFCC features.
pub const N_MFCC: usize = 13;
pub const MFCC_STATS_LEN: usize = N_MFCC * 4; // mean, std, min, max
pub const MFCC_SEQUENCE_FRAMES: usize = 100;

// Mel-spectrogram image.
pub const MEL_TIME_STEPS: usize = 128;

// power_to_db defaults.
pub const POWER_DB_AMIN: f32 = 1e-10;
pub const POWER_DB_TOP_DB: f32 = 80.0;

pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Canonical class ordering shared by every classifier.
pub const DISEASE_CLASSES: [&str; 7] = [
    "Healthy",
    "COPD",
    "Asthma",
    "Bronchiectasis",
    "URTI",
    "LRTI",
    "Pneumonia",
];
