//! Convolutional classifier adapters for MFCC sequences (1D) and mel images (2D).
//!
//! Network layout:
//! - `conv{i}` blocks: same-padded conv -> ReLU -> max-pool 2 (skipped once an
//!   axis is shorter than the pool)
//! - global average pool over time/space
//! - `dense` projection to class logits, softmax

use std::sync::Arc;

use crate::conv::{conv1d_same, conv2d_same, global_avg_pool, max_pool1d, max_pool2d};
use crate::features::FeatureTensor;
use crate::math::{relu_inplace, softmax_inplace};
use crate::ops::linear;
use crate::scorer::{ModelKind, ModelScorer, load_error, weight_error};
use crate::weights::WeightStore;
use crate::{LungError, Result};

const POOL: usize = 2;

#[derive(Debug)]
struct ConvLayer {
    channels_in: usize,
    channels_out: usize,
    /// `[kernel]` for 1D, `[kernel_h, kernel_w]` for 2D.
    kernel: Vec<usize>,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

#[derive(Debug)]
pub struct CnnScorer {
    id: String,
    kind: ModelKind,
    input_shape: Vec<usize>,
    class_names: Arc<[String]>,
    convs: Vec<ConvLayer>,
    dense_weight: Vec<f32>,
    dense_bias: Vec<f32>,
}

impl CnnScorer {
    pub fn load(
        id: &str,
        kind: ModelKind,
        store: &WeightStore,
        class_names: Arc<[String]>,
        input_shape: Vec<usize>,
    ) -> Result<Self> {
        let err = weight_error(id);
        let (rank, mut channels) = match (kind, input_shape.as_slice()) {
            (ModelKind::Cnn1d, [_, c]) => (3, *c),
            (ModelKind::Cnn2d, [_, _, c]) => (4, *c),
            _ => {
                return Err(load_error(
                    id,
                    format!("{} cannot consume input shape {input_shape:?}", kind.as_str()),
                ));
            }
        };

        let mut convs = Vec::new();
        while store.contains(&format!("conv{}.weight", convs.len())) {
            let i = convs.len();
            let w = store
                .tensor_f32(&format!("conv{i}.weight"))
                .map_err(&err)?;
            let b = store.tensor_f32(&format!("conv{i}.bias")).map_err(&err)?;
            if w.shape.len() != rank || w.shape[1] != channels {
                return Err(load_error(
                    id,
                    format!(
                        "conv{i}.weight shape {:?} does not take {channels} input channels",
                        w.shape
                    ),
                ));
            }
            if w.shape.contains(&0) {
                return Err(load_error(
                    id,
                    format!("conv{i}.weight has an empty dimension: {:?}", w.shape),
                ));
            }
            let channels_out = w.shape[0];
            if b.data.len() != channels_out {
                return Err(load_error(id, format!("conv{i}.bias length must be {channels_out}")));
            }
            convs.push(ConvLayer {
                channels_in: channels,
                channels_out,
                kernel: w.shape[2..].to_vec(),
                weight: w.data,
                bias: b.data,
            });
            channels = channels_out;
        }
        if convs.is_empty() {
            return Err(load_error(id, "no conv0.weight tensor"));
        }

        let dense = store.tensor_f32("dense.weight").map_err(&err)?;
        if dense.shape.len() != 2 || dense.shape[1] != channels {
            return Err(load_error(
                id,
                format!("dense.weight shape {:?}, expected [classes, {channels}]", dense.shape),
            ));
        }
        if dense.shape[0] != class_names.len() {
            return Err(load_error(
                id,
                LungError::LabelMismatch {
                    expected: class_names.len(),
                    got: dense.shape[0],
                },
            ));
        }
        let dense_bias = store.tensor_f32("dense.bias").map_err(&err)?.data;
        if dense_bias.len() != class_names.len() {
            return Err(load_error(id, "dense.bias length differs from class count"));
        }

        Ok(Self {
            id: id.to_string(),
            kind,
            input_shape,
            class_names,
            convs,
            dense_weight: dense.data,
            dense_bias,
        })
    }

    #[must_use]
    pub fn n_conv_layers(&self) -> usize {
        self.convs.len()
    }

    /// `[frames, coeffs]` time-major in, `[channels, pooled_len]` out.
    fn forward_1d(&self, data: &[f32]) -> (Vec<f32>, usize) {
        let (mut length, channels) = (self.input_shape[0], self.input_shape[1]);
        let mut x = vec![0.0f32; data.len()];
        for t in 0..length {
            for c in 0..channels {
                x[c * length + t] = data[t * channels + c];
            }
        }

        for layer in &self.convs {
            let mut y = vec![0.0f32; layer.channels_out * length];
            conv1d_same(
                &mut y,
                &x,
                &layer.weight,
                Some(layer.bias.as_slice()),
                layer.channels_in,
                layer.channels_out,
                length,
                layer.kernel[0],
            );
            relu_inplace(&mut y);
            if length >= POOL {
                y = max_pool1d(&y, layer.channels_out, length, POOL);
                length /= POOL;
            }
            x = y;
        }
        let channels = self.convs.last().map_or(channels, |l| l.channels_out);
        (x, channels)
    }

    /// `[h, w, c]` in, `[channels, pooled_h * pooled_w]` out.
    fn forward_2d(&self, data: &[f32]) -> (Vec<f32>, usize) {
        let (mut h, mut w, channels) = (
            self.input_shape[0],
            self.input_shape[1],
            self.input_shape[2],
        );
        let mut x = vec![0.0f32; data.len()];
        for y in 0..h {
            for col in 0..w {
                for c in 0..channels {
                    x[(c * h + y) * w + col] = data[(y * w + col) * channels + c];
                }
            }
        }

        for layer in &self.convs {
            let mut out = vec![0.0f32; layer.channels_out * h * w];
            conv2d_same(
                &mut out,
                &x,
                &layer.weight,
                Some(layer.bias.as_slice()),
                layer.channels_in,
                layer.channels_out,
                h,
                w,
                layer.kernel[0],
                layer.kernel[1],
            );
            relu_inplace(&mut out);
            if h >= POOL && w >= POOL {
                out = max_pool2d(&out, layer.channels_out, h, w, POOL);
                h /= POOL;
                w /= POOL;
            }
            x = out;
        }
        let channels = self.convs.last().map_or(channels, |l| l.channels_out);
        (x, channels)
    }
}

impl ModelScorer for CnnScorer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn probabilities(&self, features: &FeatureTensor) -> Result<Vec<f32>> {
        let (activations, channels) = match self.kind {
            ModelKind::Cnn2d => self.forward_2d(&features.data),
            _ => self.forward_1d(&features.data),
        };
        let pooled = global_avg_pool(&activations, channels);
        let mut logits = linear(
            &pooled,
            1,
            channels,
            &self.dense_weight,
            self.class_names.len(),
            Some(self.dense_bias.as_slice()),
        );
        softmax_inplace(&mut logits);
        Ok(logits)
    }
}
