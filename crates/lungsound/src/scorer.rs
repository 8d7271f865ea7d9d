//! Polymorphic classifier interface and artifact loading.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::features::{FeatureKind, FeatureTensor};
use crate::math::argmax;
use crate::weights::{WeightError, WeightStore};
use crate::{LungError, Result};

/// Underlying classifier family of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    Svm,
    Cnn1d,
    Cnn2d,
}

impl ModelKind {
    /// Feature transform this classifier family was trained on.
    #[must_use]
    pub fn feature_kind(self) -> FeatureKind {
        match self {
            Self::RandomForest | Self::Svm => FeatureKind::MfccStats,
            Self::Cnn1d => FeatureKind::MfccSequence,
            Self::Cnn2d => FeatureKind::MelSpectrogram,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::Svm => "svm",
            Self::Cnn1d => "cnn1d",
            Self::Cnn2d => "cnn2d",
        }
    }
}

/// Label and full distribution produced by one scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerOutput {
    pub label: String,
    pub index: usize,
    pub probabilities: Vec<f32>,
}

/// One loaded classifier.
///
/// Implementations are immutable after loading so a single instance can serve
/// concurrent requests.
pub trait ModelScorer: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> ModelKind;

    /// Exact feature shape accepted by [`ModelScorer::probabilities`].
    fn input_shape(&self) -> &[usize];

    fn class_names(&self) -> &[String];

    /// Class distribution for a feature tensor of [`ModelScorer::input_shape`].
    fn probabilities(&self, features: &FeatureTensor) -> Result<Vec<f32>>;

    /// Score `features` and resolve the top class to its label.
    fn predict(&self, features: &FeatureTensor) -> Result<ScorerOutput> {
        if features.shape != self.input_shape() {
            return Err(LungError::ShapeMismatch {
                model: self.id().to_string(),
                expected: self.input_shape().to_vec(),
                got: features.shape.clone(),
            });
        }

        let probabilities = self.probabilities(features)?;
        let names = self.class_names();
        if probabilities.len() != names.len() {
            return Err(LungError::LabelMismatch {
                expected: names.len(),
                got: probabilities.len(),
            });
        }

        let index = argmax(&probabilities).ok_or(LungError::LabelMismatch {
            expected: names.len(),
            got: 0,
        })?;
        Ok(ScorerOutput {
            label: names[index].clone(),
            index,
            probabilities,
        })
    }
}

pub(crate) fn load_error(id: &str, reason: impl std::fmt::Display) -> LungError {
    LungError::ModelLoad {
        model: id.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn weight_error(id: &str) -> impl Fn(WeightError) -> LungError + '_ {
    move |e| load_error(id, e)
}

/// Load the artifact at `path` as a scorer of `kind`.
///
/// `input_shape` is the feature shape the pipeline will feed it; the artifact's
/// own dimensions are checked against it and against `class_names`.
pub fn load_scorer(
    id: &str,
    kind: ModelKind,
    path: impl AsRef<Path>,
    class_names: Arc<[String]>,
    input_shape: Vec<usize>,
) -> Result<Arc<dyn ModelScorer>> {
    let store = WeightStore::open(path.as_ref()).map_err(weight_error(id))?;
    let scorer: Arc<dyn ModelScorer> = match kind {
        ModelKind::RandomForest => Arc::new(crate::forest::RandomForestScorer::load(
            id,
            &store,
            class_names,
            input_shape,
        )?),
        ModelKind::Svm => Arc::new(crate::svm::SvmScorer::load(
            id,
            &store,
            class_names,
            input_shape,
        )?),
        ModelKind::Cnn1d | ModelKind::Cnn2d => Arc::new(crate::cnn::CnnScorer::load(
            id,
            kind,
            &store,
            class_names,
            input_shape,
        )?),
    };
    Ok(scorer)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ModelKind, ModelScorer};
    use crate::features::{FeatureKind, FeatureTensor};
    use crate::{LungError, Result};

    #[derive(Debug)]
    struct Fixed {
        shape: Vec<usize>,
        names: Vec<String>,
        probs: Vec<f32>,
    }

    impl ModelScorer for Fixed {
        fn id(&self) -> &str {
            "fixed"
        }

        fn kind(&self) -> ModelKind {
            ModelKind::Svm
        }

        fn input_shape(&self) -> &[usize] {
            &self.shape
        }

        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn probabilities(&self, _features: &FeatureTensor) -> Result<Vec<f32>> {
            Ok(self.probs.clone())
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn predict_resolves_label_and_checks_shape() {
        let s = Fixed {
            shape: vec![2],
            names: names(3),
            probs: vec![0.2, 0.5, 0.3],
        };
        let out = s
            .predict(&FeatureTensor::new(vec![2], vec![0.0, 1.0]))
            .expect("predict");
        assert_eq!(out.index, 1);
        assert_eq!(out.label, "c1");

        let err = s
            .predict(&FeatureTensor::new(vec![3], vec![0.0; 3]))
            .expect_err("shape");
        assert_eq!(err.kind(), "shape_mismatch");
    }

    #[test]
    fn predict_rejects_label_count_mismatch() {
        let s = Fixed {
            shape: vec![1],
            names: names(5),
            probs: vec![1.0 / 7.0; 7],
        };
        let err = s
            .predict(&FeatureTensor::new(vec![1], vec![0.0]))
            .expect_err("mismatch");
        assert_eq!(
            err,
            LungError::LabelMismatch {
                expected: 5,
                got: 7
            }
        );
    }

    #[test]
    fn kinds_map_to_features() {
        assert_eq!(ModelKind::RandomForest.feature_kind(), FeatureKind::MfccStats);
        assert_eq!(ModelKind::Svm.feature_kind(), FeatureKind::MfccStats);
        assert_eq!(ModelKind::Cnn1d.feature_kind(), FeatureKind::MfccSequence);
        assert_eq!(ModelKind::Cnn2d.feature_kind(), FeatureKind::MelSpectrogram);
        let parsed: ModelKind = serde_json::from_str("\"random_forest\"").expect("kind");
        assert_eq!(parsed.as_str(), "random_forest");
    }

    #[test]
    fn missing_artifact_is_a_model_load_error() {
        let names: Arc<[String]> = Arc::from(names(2));
        let err = super::load_scorer(
            "ghost",
            ModelKind::Cnn1d,
            "/nonexistent/ghost.safetensors",
            names,
            vec![100, 13],
        )
        .expect_err("missing file");
        assert_eq!(err.kind(), "model_load");
    }
}
