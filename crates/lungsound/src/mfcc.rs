//! MFCCs over dB-scaled mel bands (`librosa.feature.mfcc` defaults).
//!
//! dB conversion uses `ref=1.0, amin=1e-10, top_db=80`, followed by an
//! orthonormal DCT-II along the mel axis, keeping the first `n_mfcc` coefficients.

use crate::mel::{MelConfig, MelSpectrogram};

/// Orthonormal DCT-II basis, row-major `[n_out, n_in]`.
fn build_dct_ortho(n_out: usize, n_in: usize) -> Vec<f32> {
    let n = n_in as f64;
    let scale0 = (1.0 / n).sqrt();
    let scale = (2.0 / n).sqrt();

    let mut basis = vec![0.0f32; n_out * n_in];
    for k in 0..n_out {
        let s = if k == 0 { scale0 } else { scale };
        for i in 0..n_in {
            let angle = std::f64::consts::PI * (k as f64) * (2.0 * i as f64 + 1.0) / (2.0 * n);
            basis[k * n_in + i] = (s * angle.cos()) as f32;
        }
    }
    basis
}

/// Frame-major MFCC matrix: `data[t * n_mfcc + c]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mfcc {
    pub data: Vec<f32>,
    pub n_frames: usize,
    pub n_mfcc: usize,
}

impl Mfcc {
    #[must_use]
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.data[t * self.n_mfcc..(t + 1) * self.n_mfcc]
    }

    /// Values of coefficient `c` across time.
    pub fn coefficient(&self, c: usize) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().skip(c).step_by(self.n_mfcc).copied()
    }
}

#[derive(Debug)]
pub struct MfccExtractor {
    mel: MelSpectrogram,
    n_mfcc: usize,
    dct: Vec<f32>, // [n_mfcc * n_mels]
}

impl MfccExtractor {
    #[must_use]
    pub fn new(mel_config: MelConfig, n_mfcc: usize) -> Self {
        let dct = build_dct_ortho(n_mfcc, mel_config.n_mels);
        Self {
            mel: MelSpectrogram::new(mel_config),
            n_mfcc,
            dct,
        }
    }

    #[must_use]
    pub fn n_mfcc(&self) -> usize {
        self.n_mfcc
    }

    #[must_use]
    pub fn compute(&self, samples: &[f32]) -> Mfcc {
        let mut mel = self.mel.compute(samples);
        mel.to_db(1.0);

        let n_mels = mel.n_mels;
        let mut data = vec![0.0f32; mel.n_frames * self.n_mfcc];
        for t in 0..mel.n_frames {
            let bands = mel.frame(t);
            let out = &mut data[t * self.n_mfcc..(t + 1) * self.n_mfcc];
            for (k, out_k) in out.iter_mut().enumerate() {
                let row = &self.dct[k * n_mels..(k + 1) * n_mels];
                *out_k = row.iter().zip(bands).map(|(b, x)| b * x).sum();
            }
        }

        Mfcc {
            data,
            n_frames: mel.n_frames,
            n_mfcc: self.n_mfcc,
        }
    }
}
