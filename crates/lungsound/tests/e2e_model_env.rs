use lungsound::model::ModelBundle;
use lungsound::{AudioSignal, ModelSelection, Predictor};

/// Optional integration test against a real exported model directory.
///
/// Run locally with:
/// `LUNGSOUND_MODEL_DIR=/path/to/models cargo test -p lungsound --test e2e_model_env -- --nocapture`
#[test]
fn model_dir_env_smoke() {
    let Some(model_dir) = std::env::var_os("LUNGSOUND_MODEL_DIR") else {
        eprintln!("skipping: LUNGSOUND_MODEL_DIR is not set");
        return;
    };

    let bundle = ModelBundle::load_from_dir(&model_dir).expect("load bundle");
    for (id, err) in bundle.registry.failures() {
        eprintln!("model {id} failed to load: {err}");
    }
    assert!(
        !bundle.registry.healthy().is_empty(),
        "no model in LUNGSOUND_MODEL_DIR loaded"
    );
    let n_classes = bundle.config.class_names.len();

    let predictor = Predictor::from_bundle(bundle);
    let silence = AudioSignal::new(vec![0.0; 22_050], 22_050);
    let result = predictor
        .predict(&silence, &ModelSelection::Ensemble { allow_partial: true })
        .expect("ensemble prediction");

    assert_eq!(result.probabilities.len(), n_classes);
    let total: f32 = result.probabilities.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-3, "probabilities sum to {total}");
    eprintln!("{result}");
}
