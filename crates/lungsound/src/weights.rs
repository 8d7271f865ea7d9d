//! Safetensors-backed classifier artifact loading.

use std::path::Path;

use memmap2::MmapOptions;
use safetensors::tensor::{Dtype, SafeTensorError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct TensorF32 {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorI64 {
    pub shape: Vec<usize>,
    pub data: Vec<i64>,
}

#[derive(Debug)]
pub struct WeightStore {
    mmap: memmap2::Mmap,
}

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("safetensors error: {0}")]
    SafeTensors(#[from] SafeTensorError),
    #[error("unsupported dtype for {name}: {dtype:?}")]
    UnsupportedDtype { name: String, dtype: Dtype },
    #[error("invalid tensor byte length for {name}: got {bytes}, expected multiple of {elem_size}")]
    InvalidByteLen {
        name: String,
        bytes: usize,
        elem_size: usize,
    },
}

fn check_len(name: &str, raw: &[u8], elem_size: usize) -> Result<(), WeightError> {
    if raw.len() % elem_size != 0 {
        return Err(WeightError::InvalidByteLen {
            name: name.to_string(),
            bytes: raw.len(),
            elem_size,
        });
    }
    Ok(())
}

impl WeightStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WeightError> {
        let file = std::fs::File::open(path)?;
        // SAFETY: read-only file mapping for immutable tensor access.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        // Reject non-safetensors files up front rather than on first tensor access.
        safetensors::SafeTensors::deserialize(&mmap)?;
        Ok(Self { mmap })
    }

    pub fn names(&self) -> Result<Vec<String>, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        Ok(st.iter().map(|(name, _)| name.to_string()).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        safetensors::SafeTensors::deserialize(&self.mmap)
            .map(|st| st.tensor(name).is_ok())
            .unwrap_or(false)
    }

    pub fn tensor_f32(&self, name: &str) -> Result<TensorF32, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        let tv = st.tensor(name)?;
        let dtype = tv.dtype();
        let shape = tv.shape().to_vec();
        let raw = tv.data();

        let data = match dtype {
            Dtype::F32 => {
                check_len(name, raw, 4)?;
                raw.chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }
            Dtype::F64 => {
                check_len(name, raw, 8)?;
                raw.chunks_exact(8)
                    .map(|c| {
                        f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                    })
                    .collect()
            }
            Dtype::BF16 => {
                check_len(name, raw, 2)?;
                raw.chunks_exact(2)
                    .map(|c| {
                        let bits = u16::from_le_bytes([c[0], c[1]]) as u32;
                        f32::from_bits(bits << 16)
                    })
                    .collect()
            }
            other => {
                return Err(WeightError::UnsupportedDtype {
                    name: name.to_string(),
                    dtype: other,
                });
            }
        };

        Ok(TensorF32 { shape, data })
    }

    /// Integer tensors (tree node indices, feature ids).
    pub fn tensor_i64(&self, name: &str) -> Result<TensorI64, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        let tv = st.tensor(name)?;
        let dtype = tv.dtype();
        let shape = tv.shape().to_vec();
        let raw = tv.data();

        let data = match dtype {
            Dtype::I32 => {
                check_len(name, raw, 4)?;
                raw.chunks_exact(4)
                    .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                    .collect()
            }
            Dtype::I64 => {
                check_len(name, raw, 8)?;
                raw.chunks_exact(8)
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect()
            }
            other => {
                return Err(WeightError::UnsupportedDtype {
                    name: name.to_string(),
                    dtype: other,
                });
            }
        };

        Ok(TensorI64 { shape, data })
    }
}
