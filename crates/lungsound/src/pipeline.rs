//! Single prediction entry point: audio in, formatted result out.
//!
//! Flow: resample -> fixed-duration normalize -> one feature tensor per kind the
//! selected scorers need -> score -> average (multi-model) -> format.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::audio::AudioSignal;
use crate::config::LungConfig;
use crate::ensemble::combine;
use crate::features::{FeatureExtractor, FeatureKind, FeatureTensor};
use crate::model::ModelBundle;
use crate::registry::ModelRegistry;
use crate::report::{PredictionResult, format_prediction};
use crate::scorer::ModelScorer;
use crate::{LungError, Result};

/// Which scorers take part in a prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelection {
    Single(String),
    /// Exactly these models, averaged.
    Subset(Vec<String>),
    /// Every healthy model. With `allow_partial = false`, any failed model
    /// fails the request instead of degrading the ensemble.
    Ensemble { allow_partial: bool },
}

/// Loaded scorers plus the extractor configuration they were trained against.
///
/// Read-only after construction; share one instance across threads.
#[derive(Debug)]
pub struct Predictor {
    extractor: FeatureExtractor,
    registry: ModelRegistry,
    class_names: Arc<[String]>,
    confidence_threshold: f32,
}

impl Predictor {
    #[must_use]
    pub fn new(config: &LungConfig, registry: ModelRegistry) -> Self {
        Self {
            extractor: FeatureExtractor::new(config.audio, config.features),
            registry,
            class_names: Arc::from(config.class_names.clone()),
            confidence_threshold: config.thresholds.confidence,
        }
    }

    #[must_use]
    pub fn from_bundle(bundle: ModelBundle) -> Self {
        Self::new(&bundle.config, bundle.registry)
    }

    #[must_use]
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn predict(&self, signal: &AudioSignal, selection: &ModelSelection) -> Result<PredictionResult> {
        let normalized = self.extractor.normalize(signal)?;
        self.predict_normalized(&normalized, selection)
    }

    /// Predict from samples already at the configured rate and duration.
    pub fn predict_normalized(
        &self,
        normalized: &[f32],
        selection: &ModelSelection,
    ) -> Result<PredictionResult> {
        let (scorers, unavailable) = self.select(selection)?;

        let mut features: BTreeMap<FeatureKind, FeatureTensor> = BTreeMap::new();
        let mut distributions = Vec::with_capacity(scorers.len());
        let mut single_label = None;

        for scorer in &scorers {
            if scorer.class_names() != &*self.class_names {
                return Err(LungError::LabelMismatch {
                    expected: self.class_names.len(),
                    got: scorer.class_names().len(),
                });
            }
            let kind = scorer.kind().feature_kind();
            let tensor = features
                .entry(kind)
                .or_insert_with(|| self.extractor.extract(kind, normalized));
            let out = scorer.predict(tensor)?;
            debug!(model = scorer.id(), label = %out.label, probs = ?out.probabilities, "scored");
            single_label = Some(out.label);
            distributions.push(out.probabilities);
        }

        let (label, probabilities) = match (distributions.len(), single_label) {
            (1, Some(label)) => (label, distributions.swap_remove(0)),
            _ => {
                let (index, merged) = combine(&distributions)?;
                (self.class_names[index].clone(), merged)
            }
        };

        let mut result = format_prediction(
            &label,
            &probabilities,
            &self.class_names,
            self.confidence_threshold,
        )?;
        result.models_used = scorers.iter().map(|s| s.id().to_string()).collect();
        result.models_unavailable = unavailable;
        Ok(result)
    }

    fn select(&self, selection: &ModelSelection) -> Result<(Vec<Arc<dyn ModelScorer>>, Vec<String>)> {
        match selection {
            ModelSelection::Single(id) => Ok((vec![self.registry.get(id)?], Vec::new())),
            ModelSelection::Subset(ids) => {
                if ids.is_empty() {
                    return Err(LungError::EmptyEnsemble);
                }
                let scorers = ids
                    .iter()
                    .map(|id| self.registry.get(id))
                    .collect::<Result<Vec<_>>>()?;
                Ok((scorers, Vec::new()))
            }
            ModelSelection::Ensemble { allow_partial } => {
                let failures = self.registry.failures();
                if let Some((_, first)) = failures.first() {
                    if !allow_partial {
                        return Err(first.clone());
                    }
                }
                let healthy = self.registry.healthy();
                if healthy.is_empty() {
                    return Err(LungError::NoModelsAvailable);
                }
                let unavailable: Vec<String> = failures.iter().map(|(id, _)| id.clone()).collect();
                if !unavailable.is_empty() {
                    warn!(
                        used = healthy.len(),
                        unavailable = ?unavailable,
                        "running degraded ensemble"
                    );
                }
                Ok((healthy.to_vec(), unavailable))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ModelSelection, Predictor};
    use crate::audio::AudioSignal;
    use crate::config::LungConfig;
    use crate::features::FeatureTensor;
    use crate::registry::ModelRegistry;
    use crate::scorer::{ModelKind, ModelScorer};
    use crate::{LungError, Result};

    #[derive(Debug)]
    struct Fixed {
        id: &'static str,
        kind: ModelKind,
        shape: Vec<usize>,
        names: Vec<String>,
        probs: Vec<f32>,
    }

    impl ModelScorer for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        fn kind(&self) -> ModelKind {
            self.kind
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

    fn config() -> LungConfig {
        LungConfig {
            class_names: vec!["Healthy".into(), "COPD".into(), "Asthma".into()],
            ..LungConfig::default()
        }
    }

    fn fixed(id: &'static str, kind: ModelKind, probs: [f32; 3]) -> Arc<dyn ModelScorer> {
        let cfg = config();
        Arc::new(Fixed {
            id,
            kind,
            shape: cfg.features.shape_of(kind.feature_kind()),
            names: cfg.class_names,
            probs: probs.to_vec(),
        })
    }

    fn breath() -> AudioSignal {
        // Two seconds at 44.1 kHz: exercises resampling and zero padding.
        let samples = (0..88_200)
            .map(|i| (i as f32 * 0.03).sin() * 0.2)
            .collect();
        AudioSignal::new(samples, 44_100)
    }

    fn predictor(with_failure: bool) -> Predictor {
        let mut registry = ModelRegistry::new();
        registry.insert(fixed("rf", ModelKind::RandomForest, [0.7, 0.2, 0.1]));
        registry.insert(fixed("cnn2d", ModelKind::Cnn2d, [0.5, 0.4, 0.1]));
        if with_failure {
            registry.record_failure(
                "svm",
                LungError::ModelLoad {
                    model: "svm".into(),
                    reason: "truncated artifact".into(),
                },
            );
        }
        Predictor::new(&config(), registry)
    }

    #[test]
    fn predictor_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Predictor>();
    }

    #[test]
    fn single_model_result() {
        let p = predictor(false);
        let r = p
            .predict(&breath(), &ModelSelection::Single("cnn2d".into()))
            .expect("predict");
        assert_eq!(r.predicted_condition, "Healthy");
        assert!((r.confidence - 0.5).abs() < 1e-6);
        assert!(!r.is_reliable);
        assert_eq!(r.models_used, vec!["cnn2d"]);
    }

    #[test]
    fn ensemble_averages_all_healthy_models() {
        let p = predictor(false);
        let r = p
            .predict(&breath(), &ModelSelection::Ensemble { allow_partial: false })
            .expect("predict");
        assert_eq!(r.predicted_condition, "Healthy");
        assert!((r.confidence - 0.6).abs() < 1e-6);
        assert_eq!(r.probabilities.get("COPD").map(|v| (v * 10.0).round()), Some(3.0));
        assert_eq!(r.models_used, vec!["rf", "cnn2d"]);
        assert!(r.models_unavailable.is_empty());
    }

    #[test]
    fn degraded_ensemble_policy() {
        let p = predictor(true);
        let strict = p
            .predict(&breath(), &ModelSelection::Ensemble { allow_partial: false })
            .expect_err("strict");
        assert_eq!(strict.kind(), "model_load");

        let r = p
            .predict(&breath(), &ModelSelection::Ensemble { allow_partial: true })
            .expect("partial");
        assert_eq!(r.models_unavailable, vec!["svm"]);
        assert_eq!(r.models_used.len(), 2);

        let err = p
            .predict(&breath(), &ModelSelection::Single("svm".into()))
            .expect_err("failed model");
        assert_eq!(err.kind(), "model_load");
    }

    #[test]
    fn selection_errors() {
        let empty = Predictor::new(&config(), ModelRegistry::new());
        assert_eq!(
            empty
                .predict(&breath(), &ModelSelection::Ensemble { allow_partial: true })
                .expect_err("none"),
            LungError::NoModelsAvailable
        );

        let p = predictor(false);
        assert_eq!(
            p.predict(&breath(), &ModelSelection::Single("knn".into()))
                .expect_err("unknown"),
            LungError::UnknownModel("knn".into())
        );
        assert_eq!(
            p.predict(&breath(), &ModelSelection::Subset(Vec::new()))
                .expect_err("empty subset"),
            LungError::EmptyEnsemble
        );
        let r = p
            .predict(&breath(), &ModelSelection::Subset(vec!["rf".into()]))
            .expect("subset");
        assert!((r.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn scorer_with_foreign_label_set_is_rejected() {
        let mut registry = ModelRegistry::new();
        registry.insert(Arc::new(Fixed {
            id: "old",
            kind: ModelKind::Svm,
            shape: vec![52],
            names: vec!["Healthy".into(), "Other".into()],
            probs: vec![0.5, 0.5],
        }));
        let p = Predictor::new(&config(), registry);
        let err = p
            .predict(&breath(), &ModelSelection::Single("old".into()))
            .expect_err("labels");
        assert_eq!(
            err,
            LungError::LabelMismatch {
                expected: 3,
                got: 2
            }
        );
    }
}
