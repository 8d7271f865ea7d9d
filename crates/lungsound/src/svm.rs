//! Support vector classifier adapter (one-vs-rest, Platt-calibrated).

use std::sync::Arc;

use crate::features::FeatureTensor;
use crate::math::normalize_sum_inplace;
use crate::ops::{dot, squared_distance, standardize_inplace};
use crate::scorer::{ModelKind, ModelScorer, load_error, weight_error};
use crate::weights::WeightStore;
use crate::{LungError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kernel {
    Linear,
    Rbf { gamma: f32 },
}

#[derive(Debug)]
struct Scaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

#[derive(Debug)]
pub struct SvmScorer {
    id: String,
    input_shape: Vec<usize>,
    class_names: Arc<[String]>,
    scaler: Option<Scaler>,
    kernel: Kernel,
    dim: usize,
    /// `[n_sv, dim]`
    support_vectors: Vec<f32>,
    /// `[n_classes, n_sv]`
    dual_coef: Vec<f32>,
    intercept: Vec<f32>,
    platt_a: Vec<f32>,
    platt_b: Vec<f32>,
}

impl SvmScorer {
    pub fn load(
        id: &str,
        store: &WeightStore,
        class_names: Arc<[String]>,
        input_shape: Vec<usize>,
    ) -> Result<Self> {
        let err = weight_error(id);
        let dim: usize = input_shape.iter().product();
        let n_classes = class_names.len();

        let scaler = if store.contains("scaler.mean") {
            let mean = store.tensor_f32("scaler.mean").map_err(&err)?.data;
            let scale = store.tensor_f32("scaler.scale").map_err(&err)?.data;
            if mean.len() != dim || scale.len() != dim {
                return Err(load_error(id, format!("scaler length must be {dim}")));
            }
            Some(Scaler { mean, scale })
        } else {
            None
        };

        let sv = store.tensor_f32("svm.support_vectors").map_err(&err)?;
        if sv.shape.len() != 2 || sv.shape[1] != dim {
            return Err(load_error(
                id,
                format!("svm.support_vectors shape {:?}, expected [n_sv, {dim}]", sv.shape),
            ));
        }
        let n_sv = sv.shape[0];
        if n_sv == 0 {
            return Err(load_error(id, "svm has no support vectors"));
        }

        let dual = store.tensor_f32("svm.dual_coef").map_err(&err)?;
        if dual.shape.len() != 2 || dual.shape[1] != n_sv {
            return Err(load_error(
                id,
                format!("svm.dual_coef shape {:?}, expected [classes, {n_sv}]", dual.shape),
            ));
        }
        if dual.shape[0] != n_classes {
            return Err(load_error(
                id,
                LungError::LabelMismatch {
                    expected: n_classes,
                    got: dual.shape[0],
                },
            ));
        }

        let intercept = store.tensor_f32("svm.intercept").map_err(&err)?.data;
        let platt_a = store.tensor_f32("svm.platt_a").map_err(&err)?.data;
        let platt_b = store.tensor_f32("svm.platt_b").map_err(&err)?.data;
        for (name, v) in [
            ("svm.intercept", &intercept),
            ("svm.platt_a", &platt_a),
            ("svm.platt_b", &platt_b),
        ] {
            if v.len() != n_classes {
                return Err(load_error(id, format!("{name} length {}, expected {n_classes}", v.len())));
            }
        }

        let gamma = store
            .tensor_f32("svm.gamma")
            .map_err(&err)?
            .data
            .first()
            .copied()
            .ok_or_else(|| load_error(id, "svm.gamma is empty"))?;
        let kernel = if gamma == 0.0 {
            Kernel::Linear
        } else {
            Kernel::Rbf { gamma }
        };

        Ok(Self {
            id: id.to_string(),
            input_shape,
            class_names,
            scaler,
            kernel,
            dim,
            support_vectors: sv.data,
            dual_coef: dual.data,
            intercept,
            platt_a,
            platt_b,
        })
    }

    /// Raw one-vs-rest decision values.
    fn decision(&self, x: &[f32]) -> Vec<f32> {
        let k: Vec<f32> = self
            .support_vectors
            .chunks_exact(self.dim)
            .map(|sv| match self.kernel {
                Kernel::Linear => dot(sv, x),
                Kernel::Rbf { gamma } => (-gamma * squared_distance(sv, x)).exp(),
            })
            .collect();

        self.dual_coef
            .chunks_exact(k.len())
            .zip(&self.intercept)
            .map(|(coef, &b)| dot(coef, &k) + b)
            .collect()
    }
}

impl ModelScorer for SvmScorer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Svm
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn probabilities(&self, features: &FeatureTensor) -> Result<Vec<f32>> {
        let mut x = features.data.clone();
        if let Some(s) = &self.scaler {
            standardize_inplace(&mut x, &s.mean, &s.scale);
        }

        let mut probs: Vec<f32> = self
            .decision(&x)
            .iter()
            .zip(self.platt_a.iter().zip(&self.platt_b))
            .map(|(&f, (&a, &b))| 1.0 / (1.0 + (a * f + b).exp()))
            .collect();
        if !normalize_sum_inplace(&mut probs) {
            return Err(LungError::Scoring {
                model: self.id.clone(),
                reason: format!("calibrated probabilities sum to zero: {probs:?}"),
            });
        }
        tracing::debug!(model = %self.id, ?probs, "svm scored");
        Ok(probs)
    }
}
