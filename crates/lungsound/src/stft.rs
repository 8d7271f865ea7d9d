//! Centered short-time Fourier transform and its overlap-add inverse.
//!
//! Framing follows librosa (`center=True`, zero padding of `n_fft/2` on both
//! sides, periodic Hann window), so frame `t` is centred on sample `t * hop`.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

fn build_hann_window(n: usize) -> Vec<f32> {
    // Periodic Hann: 0.5*(1-cos(2*pi*i/N))
    (0..n)
        .map(|i| {
            let angle = 2.0 * std::f32::consts::PI * (i as f32) / (n as f32);
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}

/// Frame-major complex spectrum: `bins[t * n_freq + k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub bins: Vec<Complex<f32>>,
    pub n_frames: usize,
    pub n_freq: usize,
}

impl Spectrum {
    #[must_use]
    pub fn frame(&self, t: usize) -> &[Complex<f32>] {
        &self.bins[t * self.n_freq..(t + 1) * self.n_freq]
    }
}

/// Planned forward/inverse transforms; immutable and shareable across threads.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .finish_non_exhaustive()
    }
}

impl Stft {
    #[must_use]
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            n_fft,
            hop_length,
            window: build_hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    #[must_use]
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    #[must_use]
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    #[must_use]
    pub fn n_freq(&self) -> usize {
        self.n_fft / 2 + 1
    }

    #[must_use]
    pub fn n_frames(&self, n_samples: usize) -> usize {
        1 + n_samples / self.hop_length
    }

    /// Apply `f(frame_index, spectrum_of_frame)` to every centered frame.
    ///
    /// The spectrum slice holds the non-negative frequencies (`n_fft/2 + 1` bins).
    pub fn for_each_frame(&self, samples: &[f32], mut f: impl FnMut(usize, &[Complex<f32>])) {
        let n_fft = self.n_fft;
        let pad = n_fft / 2;

        // Right side gets the odd sample so the last frame stays in bounds.
        let mut padded = vec![0.0f32; samples.len() + n_fft];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.forward.get_inplace_scratch_len()];

        for t in 0..self.n_frames(samples.len()) {
            let start = t * self.hop_length;
            let frame = &padded[start..start + n_fft];
            for ((b, &x), &w) in buffer.iter_mut().zip(frame).zip(&self.window) {
                *b = Complex::new(x * w, 0.0);
            }
            self.forward.process_with_scratch(&mut buffer, &mut scratch);
            f(t, &buffer[..self.n_freq()]);
        }
    }

    #[must_use]
    pub fn forward(&self, samples: &[f32]) -> Spectrum {
        let n_freq = self.n_freq();
        let n_frames = self.n_frames(samples.len());
        let mut bins = Vec::with_capacity(n_frames * n_freq);
        self.for_each_frame(samples, |_, spec| bins.extend_from_slice(spec));
        Spectrum {
            bins,
            n_frames,
            n_freq,
        }
    }

    /// Windowed overlap-add inverse, trimmed to `length` samples.
    #[must_use]
    pub fn inverse(&self, spectrum: &Spectrum, length: usize) -> Vec<f32> {
        let n_fft = self.n_fft;
        let hop = self.hop_length;
        let n_freq = self.n_freq();
        debug_assert_eq!(spectrum.n_freq, n_freq);

        let total = n_fft + hop * spectrum.n_frames.saturating_sub(1);
        let mut out = vec![0.0f32; total];
        let mut win_sq = vec![0.0f32; total];

        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.inverse.get_inplace_scratch_len()];
        let scale = 1.0 / n_fft as f32;

        for t in 0..spectrum.n_frames {
            let frame = spectrum.frame(t);
            buffer[..n_freq].copy_from_slice(frame);
            // Hermitian mirror for a real-valued output.
            for k in n_freq..n_fft {
                buffer[k] = frame[n_fft - k].conj();
            }
            self.inverse.process_with_scratch(&mut buffer, &mut scratch);

            let start = t * hop;
            for (i, &w) in self.window.iter().enumerate() {
                out[start + i] += buffer[i].re * scale * w;
                win_sq[start + i] += w * w;
            }
        }

        for (o, &ws) in out.iter_mut().zip(&win_sq) {
            if ws > 1e-8 {
                *o /= ws;
            }
        }

        let pad = n_fft / 2;
        let mut trimmed: Vec<f32> = out.into_iter().skip(pad).take(length).collect();
        trimmed.resize(length, 0.0);
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_centered_stft() {
        let stft = Stft::new(2048, 512);
        assert_eq!(stft.n_frames(88_200), 173);
        assert_eq!(stft.forward(&[0.0; 1024]).n_frames, 3);
    }

    #[test]
    fn odd_window_covers_the_last_frame() {
        // 1200 is a multiple of the hop, so the last frame starts at the final sample.
        let stft = Stft::new(2047, 600);
        let x = vec![0.25f32; 1200];
        let spec = stft.forward(&x);
        assert_eq!(spec.n_frames, 3);
        assert_eq!(spec.n_freq, 1024);
        assert_eq!(spec.bins.len(), 3 * 1024);
    }

    #[test]
    fn inverse_reconstructs_signal() {
        let stft = Stft::new(256, 64);
        let x: Vec<f32> = (0..2000)
            .map(|i| (i as f32 * 0.05).sin() * 0.5 + (i as f32 * 0.31).cos() * 0.2)
            .collect();
        let y = stft.inverse(&stft.forward(&x), x.len());
        assert_eq!(y.len(), x.len());
        let max_err = x
            .iter()
            .zip(&y)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max reconstruction error {max_err}");
    }
}
