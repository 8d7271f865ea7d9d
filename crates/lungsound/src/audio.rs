//! Audio utilities.
//!
//! Scope:
//! - mono f32 samples
//! - linear resampling to the canonical rate
//! - minimal WAV parser (PCM 8/16/24/32-bit, IEEE float 32/64-bit)
//! - fixed-duration normalization (right zero-pad or truncate)

use std::path::Path;

use crate::{LungError, Result};

/// Decoded mono audio at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl AudioSignal {
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate_hz as f32
    }

    /// Resample to `dst_hz` (no-op when the rate already matches).
    #[must_use]
    pub fn resampled(&self, dst_hz: u32) -> Self {
        Self {
            samples: resample_linear_mono_f32(&self.samples, self.sample_rate_hz, dst_hz),
            sample_rate_hz: dst_hz,
        }
    }
}

/// Fix `signal` to exactly `sample_rate_hz * duration_secs` samples.
///
/// Shorter input is right-padded with zeros, longer input keeps its leading samples.
#[must_use]
pub fn normalize_duration(signal: &[f32], sample_rate_hz: u32, duration_secs: u32) -> Vec<f32> {
    let target = (sample_rate_hz as usize) * (duration_secs as usize);
    let mut out = Vec::with_capacity(target);
    let keep = signal.len().min(target);
    out.extend_from_slice(&signal[..keep]);
    out.resize(target, 0.0);
    out
}

/// Linearly resample `input` from `src_hz` to `dst_hz`.
#[must_use]
pub fn resample_linear_mono_f32(input: &[f32], src_hz: u32, dst_hz: u32) -> Vec<f32> {
    if src_hz == dst_hz || input.is_empty() || src_hz == 0 || dst_hz == 0 {
        return input.to_vec();
    }

    let new_n = ((input.len() as u64) * u64::from(dst_hz) / u64::from(src_hz)) as usize;
    let mut out = vec![0.0f32; new_n];
    let step = f64::from(src_hz) / f64::from(dst_hz);

    for (i, y) in out.iter_mut().enumerate() {
        let src_pos = (i as f64) * step;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = input.get(idx).copied().unwrap_or(0.0);
        let b = input.get(idx + 1).copied().unwrap_or(a);
        *y = a * (1.0 - frac) + b * frac;
    }

    out
}

/// Linearly stretch `input` onto exactly `out_len` samples spanning the same extent.
#[must_use]
pub fn resample_to_len(input: &[f32], out_len: usize) -> Vec<f32> {
    if input.len() == out_len {
        return input.to_vec();
    }
    if input.is_empty() {
        return vec![0.0; out_len];
    }

    let step = input.len() as f64 / out_len.max(1) as f64;
    (0..out_len)
        .map(|i| {
            let src_pos = (i as f64) * step;
            let idx = src_pos.floor() as usize;
            let frac = (src_pos - idx as f64) as f32;
            let a = input.get(idx).copied().unwrap_or(0.0);
            let b = input.get(idx + 1).copied().unwrap_or(a);
            a * (1.0 - frac) + b * frac
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct WavData {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub samples_mono: Vec<f32>,
}

impl From<WavData> for AudioSignal {
    fn from(wav: WavData) -> Self {
        Self::new(wav.samples_mono, wav.sample_rate_hz)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("not a valid WAV file")]
    InvalidHeader,
    #[error("unsupported WAV format (format tag {format}, {bits} bits)")]
    UnsupportedFormat { format: u16, bits: u16 },
    #[error("malformed WAV chunks")]
    MalformedChunks,
    #[error("WAV header declares zero channels or zero sample rate")]
    EmptyStream,
}

impl From<WavError> for LungError {
    fn from(e: WavError) -> Self {
        LungError::Decode(e.to_string())
    }
}

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

fn read_u16_le(p: &[u8]) -> u16 {
    u16::from_le_bytes([p[0], p[1]])
}

fn read_u32_le(p: &[u8]) -> u32 {
    u32::from_le_bytes([p[0], p[1], p[2], p[3]])
}

fn decode_sample(format: u16, bits: u16, b: &[u8]) -> f32 {
    match (format, bits) {
        (FORMAT_PCM, 8) => (f32::from(b[0]) - 128.0) / 128.0,
        (FORMAT_PCM, 16) => f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0,
        (FORMAT_PCM, 24) => {
            let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        (FORMAT_PCM, 32) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0,
        (FORMAT_IEEE_FLOAT, 32) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        (FORMAT_IEEE_FLOAT, 64) => {
            f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
        }
        _ => 0.0,
    }
}

fn is_supported(format: u16, bits: u16) -> bool {
    matches!(
        (format, bits),
        (FORMAT_PCM, 8 | 16 | 24 | 32) | (FORMAT_IEEE_FLOAT, 32 | 64)
    )
}

/// Parse WAV bytes and return mono `f32` samples at the file's sample rate.
///
/// Multi-channel frames are averaged into one channel.
pub fn parse_wav_bytes(data: &[u8]) -> Result<WavData, WavError> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(WavError::InvalidHeader);
    }

    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut pcm_data: Option<&[u8]> = None;

    let mut p = 12usize;
    while p + 8 <= data.len() {
        let chunk_id = &data[p..p + 4];
        let chunk_size = read_u32_le(&data[p + 4..p + 8]) as usize;
        let start = p + 8;
        let end = start.saturating_add(chunk_size).min(data.len());

        if chunk_id == b"fmt " {
            if chunk_size < 16 || start + 16 > data.len() {
                return Err(WavError::MalformedChunks);
            }
            let c = &data[start..end];
            let mut format = read_u16_le(&c[0..2]);
            let channels = read_u16_le(&c[2..4]);
            let sample_rate_hz = read_u32_le(&c[4..8]);
            let bits = read_u16_le(&c[14..16]);
            // Extensible: the sub-format GUID starts with the real format tag.
            if format == FORMAT_EXTENSIBLE {
                if c.len() < 26 {
                    return Err(WavError::MalformedChunks);
                }
                format = read_u16_le(&c[24..26]);
            }
            fmt = Some((format, channels, sample_rate_hz, bits));
        } else if chunk_id == b"data" {
            // Streamed writers may leave a bogus size; take what is there.
            pcm_data = Some(&data[start..end]);
        }

        p = start.saturating_add(chunk_size);
        if chunk_size & 1 == 1 {
            p = p.saturating_add(1);
        }
    }

    let (Some((format, channels, sample_rate_hz, bits)), Some(pcm_data)) = (fmt, pcm_data) else {
        return Err(WavError::MalformedChunks);
    };

    if !is_supported(format, bits) {
        return Err(WavError::UnsupportedFormat { format, bits });
    }
    if channels == 0 || sample_rate_hz == 0 {
        return Err(WavError::EmptyStream);
    }

    let sample_bytes = usize::from(bits / 8);
    let frame_bytes = usize::from(channels) * sample_bytes;
    let inv_channels = 1.0 / f32::from(channels);

    let samples_mono = pcm_data
        .chunks_exact(frame_bytes)
        .map(|frame| {
            let sum: f32 = frame
                .chunks_exact(sample_bytes)
                .map(|s| decode_sample(format, bits, s))
                .sum();
            sum * inv_channels
        })
        .collect();

    Ok(WavData {
        sample_rate_hz,
        channels,
        samples_mono,
    })
}

/// Read and decode a WAV file.
pub fn load_wav_file(path: impl AsRef<Path>) -> Result<AudioSignal> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| LungError::Decode(format!("read {}: {e}", path.display())))?;
    let wav = parse_wav_bytes(&bytes)?;
    Ok(wav.into())
}

/// Interpret headerless bytes as s16le mono samples.
#[must_use]
pub fn samples_from_raw_s16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a WAV byte stream for tests.
    pub(crate) fn wav_bytes(
        format: u16,
        channels: u16,
        sample_rate_hz: u32,
        bits: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let block_align = channels * (bits / 8);
        let mut wav = Vec::<u8>::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36u32 + payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&(16u32).to_le_bytes());
        wav.extend_from_slice(&format.to_le_bytes());
        wav.extend_from_slice(&channels.to_le_bytes());
        wav.extend_from_slice(&sample_rate_hz.to_le_bytes());
        wav.extend_from_slice(&(sample_rate_hz * u32::from(block_align)).to_le_bytes());
        wav.extend_from_slice(&block_align.to_le_bytes());
        wav.extend_from_slice(&bits.to_le_bytes());

        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(payload);
        wav
    }

    #[test]
    fn normalize_pads_short_signal() {
        let x = vec![0.5f32; 1000];
        let y = normalize_duration(&x, 22_050, 4);
        assert_eq!(y.len(), 88_200);
        assert_eq!(y[999], 0.5);
        assert!(y[1000..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn normalize_truncates_long_signal() {
        let x: Vec<f32> = (0..100_000).map(|i| i as f32).collect();
        let y = normalize_duration(&x, 22_050, 4);
        assert_eq!(y.len(), 88_200);
        assert_eq!(y[88_199], 88_199.0);
    }

    #[test]
    fn normalize_exact_length_is_identity() {
        let x = vec![0.25f32; 88_200];
        assert_eq!(normalize_duration(&x, 22_050, 4), x);
        assert_eq!(normalize_duration(&[], 22_050, 4).len(), 88_200);
    }

    #[test]
    fn resample_linear_identity() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = resample_linear_mono_f32(&x, 22_050, 22_050);
        assert_eq!(x, y);
    }

    #[test]
    fn resample_linear_length() {
        let x = vec![0.0f32; 44_100];
        let y = resample_linear_mono_f32(&x, 44_100, 22_050);
        assert_eq!(y.len(), 22_050);
    }

    #[test]
    fn wav_parse_pcm16_mono() {
        let payload = [0i16, 16_384].iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<_>>();
        let wav = wav_bytes(FORMAT_PCM, 1, 22_050, 16, &payload);
        let parsed = parse_wav_bytes(&wav).expect("parse wav");
        assert_eq!(parsed.sample_rate_hz, 22_050);
        assert_eq!(parsed.channels, 1);
        assert_eq!(parsed.samples_mono.len(), 2);
        assert!((parsed.samples_mono[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn wav_parse_float_stereo_downmix() {
        let payload = [0.5f32, -0.5, 1.0, 0.0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect::<Vec<_>>();
        let wav = wav_bytes(FORMAT_IEEE_FLOAT, 2, 44_100, 32, &payload);
        let parsed = parse_wav_bytes(&wav).expect("parse wav");
        assert_eq!(parsed.samples_mono, vec![0.0, 0.5]);
    }

    #[test]
    fn wav_parse_pcm24() {
        // -0.5 full scale in 24-bit little endian.
        let v: i32 = -4_194_304;
        let b = v.to_le_bytes();
        let wav = wav_bytes(FORMAT_PCM, 1, 8_000, 24, &[b[0], b[1], b[2]]);
        let parsed = parse_wav_bytes(&wav).expect("parse wav");
        assert!((parsed.samples_mono[0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn wav_rejects_garbage_and_unsupported() {
        assert!(matches!(
            parse_wav_bytes(b"not a wav file at all"),
            Err(WavError::InvalidHeader)
        ));
        let wav = wav_bytes(2, 1, 8_000, 4, &[0, 0]);
        assert!(matches!(
            parse_wav_bytes(&wav),
            Err(WavError::UnsupportedFormat { format: 2, bits: 4 })
        ));
        let wav = wav_bytes(FORMAT_PCM, 1, 0, 16, &[0, 0]);
        assert!(matches!(parse_wav_bytes(&wav), Err(WavError::EmptyStream)));
    }

    #[test]
    fn decode_failure_maps_to_decode_error() {
        let err = load_wav_file("/nonexistent/lungsound/recording.wav").unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
