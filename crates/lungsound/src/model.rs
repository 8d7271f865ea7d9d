//! Model directory loading: `config.json` plus the classifier artifacts it lists.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::LungConfig;
use crate::registry::ModelRegistry;

#[derive(Debug)]
pub struct ModelBundle {
    pub dir: PathBuf,
    pub config: LungConfig,
    pub registry: ModelRegistry,
}

fn config_path(dir: &Path) -> PathBuf {
    dir.join("config.json")
}

impl ModelBundle {
    /// Parse and validate `config.json`, then load every listed model.
    ///
    /// Individual model failures are recorded in the registry; only a missing
    /// or invalid configuration fails the bundle.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config = LungConfig::from_path(config_path(dir)).context("load config.json")?;
        let registry = ModelRegistry::load(dir, &config);
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::ModelBundle;
    use crate::weights::tests::{TestTensor, write_tensors};

    fn tmp_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("lungsound-model-test-{nanos}"));
        std::fs::create_dir_all(&p).expect("mkdir");
        p
    }

    fn write_fixture_model_dir(dir: &Path) {
        let config = r#"
        {
          "class_names": ["Healthy", "COPD"],
          "features": { "n_mfcc": 2, "n_mels": 8 },
          "models": [
            { "id": "svm", "kind": "svm", "path": "svm.safetensors" },
            { "id": "rf", "kind": "random_forest", "path": "rf.safetensors" }
          ]
        }
        "#;
        std::fs::write(dir.join("config.json"), config).expect("write config");

        let sv: Vec<f32> = (0..8).map(|i| i as f32).collect();
        write_tensors(
            &dir.join("svm.safetensors"),
            vec![
                ("svm.support_vectors", TestTensor::f32(vec![1, 8], &sv)),
                ("svm.dual_coef", TestTensor::f32(vec![2, 1], &[1.0, -1.0])),
                ("svm.intercept", TestTensor::f32(vec![2], &[0.0, 0.0])),
                ("svm.gamma", TestTensor::f32(vec![1], &[0.0])),
                ("svm.platt_a", TestTensor::f32(vec![2], &[-1.0, -1.0])),
                ("svm.platt_b", TestTensor::f32(vec![2], &[0.0, 0.0])),
            ],
        );
    }

    #[test]
    fn loads_config_and_partial_registry() {
        let dir = tmp_dir();
        write_fixture_model_dir(&dir);

        let bundle = ModelBundle::load_from_dir(&dir).expect("bundle");
        assert_eq!(bundle.config.class_names, vec!["Healthy", "COPD"]);
        assert_eq!(bundle.config.features.shape_of(crate::FeatureKind::MfccStats), vec![8]);
        assert_eq!(bundle.registry.healthy().len(), 1);
        assert_eq!(bundle.registry.healthy()[0].id(), "svm");
        assert_eq!(bundle.registry.failures()[0].0, "rf");

        std::fs::remove_dir_all(dir).expect("cleanup");
    }

    #[test]
    fn missing_config_fails_the_bundle() {
        let dir = tmp_dir();
        let err = ModelBundle::load_from_dir(&dir).expect_err("no config");
        assert!(format!("{err:#}").contains("config.json"), "{err:#}");
        std::fs::remove_dir_all(dir).expect("cleanup");
    }
}
