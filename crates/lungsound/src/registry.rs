//! Loaded scorers keyed by model id.
//!
//! Built once at startup and shared read-only; a model that fails to load is
//! recorded instead of aborting the whole registry.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::LungConfig;
use crate::scorer::{ModelScorer, load_scorer};
use crate::{LungError, Result};

#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    scorers: Vec<Arc<dyn ModelScorer>>,
    failures: Vec<(String, LungError)>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every model listed in `config`, resolving artifact paths against `dir`.
    #[must_use]
    pub fn load(dir: impl AsRef<Path>, config: &LungConfig) -> Self {
        let dir = dir.as_ref();
        let class_names: Arc<[String]> = Arc::from(config.class_names.clone());
        let mut registry = Self::new();

        for entry in &config.models {
            let path = dir.join(&entry.path);
            let shape = config.features.shape_of(entry.kind.feature_kind());
            match load_scorer(&entry.id, entry.kind, &path, Arc::clone(&class_names), shape) {
                Ok(scorer) => {
                    info!(model = %entry.id, kind = entry.kind.as_str(), "loaded model");
                    registry.insert(scorer);
                }
                Err(e) => {
                    warn!(model = %entry.id, path = %path.display(), error = %e, "model unavailable");
                    registry.record_failure(&entry.id, e);
                }
            }
        }

        info!(
            healthy = registry.scorers.len(),
            failed = registry.failures.len(),
            "model registry ready"
        );
        registry
    }

    /// Add or replace a scorer under its own id.
    pub fn insert(&mut self, scorer: Arc<dyn ModelScorer>) {
        self.failures.retain(|(id, _)| id != scorer.id());
        match self.scorers.iter_mut().find(|s| s.id() == scorer.id()) {
            Some(slot) => *slot = scorer,
            None => self.scorers.push(scorer),
        }
    }

    pub fn record_failure(&mut self, id: &str, error: LungError) {
        self.scorers.retain(|s| s.id() != id);
        self.failures.retain(|(f, _)| f != id);
        self.failures.push((id.to_string(), error));
    }

    /// The scorer for `id`, or the error that kept it from loading.
    pub fn get(&self, id: &str) -> Result<Arc<dyn ModelScorer>> {
        if let Some(s) = self.scorers.iter().find(|s| s.id() == id) {
            return Ok(Arc::clone(s));
        }
        match self.failures.iter().find(|(f, _)| f == id) {
            Some((_, e)) => Err(e.clone()),
            None => Err(LungError::UnknownModel(id.to_string())),
        }
    }

    /// Successfully loaded scorers, in configuration order.
    #[must_use]
    pub fn healthy(&self) -> &[Arc<dyn ModelScorer>] {
        &self.scorers
    }

    #[must_use]
    pub fn failures(&self) -> &[(String, LungError)] {
        &self.failures
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty() && self.failures.is_empty()
    }
}
