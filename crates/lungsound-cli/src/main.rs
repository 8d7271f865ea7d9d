use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use lungsound::audio::{load_wav_file, parse_wav_bytes, samples_from_raw_s16le};
use lungsound::config::LungConfig;
use lungsound::constants::SAMPLE_RATE_HZ;
use lungsound::model::ModelBundle;
use lungsound::report::ApiPrediction;
use lungsound::{AudioSignal, FeatureExtractor, FeatureKind, LungError, ModelSelection, Predictor};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "lungsound")]
#[command(about = "Lung-condition prediction from breathing recordings", long_about = None)]
struct Args {
    /// Path to a WAV file.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Read audio from stdin (WAV or raw s16le 22.05kHz mono).
    #[arg(long, default_value_t = false)]
    stdin: bool,

    /// Model directory with config.json and the classifier artifacts it lists.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Score with a single model id.
    #[arg(long, conflicts_with = "ensemble")]
    model: Option<String>,

    /// Average every loaded model.
    #[arg(long, default_value_t = false)]
    ensemble: bool,

    /// With --ensemble, fail instead of running without models that did not load.
    #[arg(long, default_value_t = false, requires = "ensemble")]
    strict: bool,

    /// Print the full result as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Print the HTTP API response shape (prediction, confidence, probabilities).
    #[arg(long, default_value_t = false)]
    api: bool,

    /// Load the model directory and report which models are usable.
    #[arg(long, default_value_t = false)]
    inspect_model: bool,

    /// Print one feature tensor's shape and summary without loading models.
    #[arg(long, value_name = "mfcc-stats|mfcc-sequence|mel")]
    features: Option<FeatureKind>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.inspect_model {
        let model_dir = args
            .model_dir
            .as_ref()
            .context("--inspect-model requires --model-dir")?;
        return inspect_model(model_dir);
    }

    let modes = u32::from(args.audio.is_some()) + u32::from(args.stdin);
    if modes != 1 {
        anyhow::bail!("choose exactly one input mode: --audio or --stdin");
    }
    let signal = read_input(&args)?;
    info!(
        samples = signal.samples.len(),
        sample_rate_hz = signal.sample_rate_hz,
        "decoded audio"
    );

    if let Some(kind) = args.features {
        let config = match &args.model_dir {
            Some(dir) => LungConfig::from_path(dir.join("config.json")).context("load config.json")?,
            None => LungConfig::default(),
        };
        return run_features(&config, &signal, kind);
    }

    let model_dir = args
        .model_dir
        .as_ref()
        .context("prediction requires --model-dir")?;
    let selection = match (&args.model, args.ensemble) {
        (Some(id), false) => ModelSelection::Single(id.clone()),
        (None, true) => ModelSelection::Ensemble {
            allow_partial: !args.strict,
        },
        _ => anyhow::bail!("choose --model <id> or --ensemble"),
    };

    let bundle = ModelBundle::load_from_dir(model_dir).context("load model directory")?;
    let predictor = Predictor::from_bundle(bundle);
    let result = predictor
        .predict(&signal, &selection)
        .map_err(tagged)?;

    if args.api {
        println!("{}", serde_json::to_string_pretty(&ApiPrediction::from(&result))?);
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{result}");
    }
    Ok(())
}

fn tagged(e: LungError) -> anyhow::Error {
    anyhow::anyhow!("[{}] {e}", e.kind())
}

fn read_input(args: &Args) -> Result<AudioSignal> {
    if let Some(path) = &args.audio {
        return load_wav_file(path).map_err(tagged);
    }

    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("read stdin")?;

    if buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE" {
        let wav = parse_wav_bytes(&buf).map_err(|e| tagged(e.into()))?;
        Ok(wav.into())
    } else {
        // raw s16le 22.05kHz mono
        Ok(AudioSignal::new(samples_from_raw_s16le(&buf), SAMPLE_RATE_HZ))
    }
}

fn run_features(config: &LungConfig, signal: &AudioSignal, kind: FeatureKind) -> Result<()> {
    let extractor = FeatureExtractor::new(config.audio, config.features);
    let normalized = extractor.normalize(signal).map_err(tagged)?;
    let tensor = extractor.extract(kind, &normalized);

    let n = tensor.data.len().max(1) as f64;
    let mean = tensor.data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let min = tensor.data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = tensor.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    println!(
        "{}: shape={:?} min={min:.4} max={max:.4} mean={mean:.4}",
        kind.as_str(),
        tensor.shape
    );
    Ok(())
}

fn inspect_model(model_dir: &Path) -> Result<()> {
    let bundle = ModelBundle::load_from_dir(model_dir).context("load model directory")?;
    eprintln!(
        "config ok: sample_rate={} duration={}s classes={} threshold={}",
        bundle.config.audio.sample_rate_hz,
        bundle.config.audio.duration_secs,
        bundle.config.class_names.len(),
        bundle.config.thresholds.confidence
    );
    for scorer in bundle.registry.healthy() {
        eprintln!(
            "model ok: id={} kind={} input_shape={:?}",
            scorer.id(),
            scorer.kind().as_str(),
            scorer.input_shape()
        );
    }
    for (id, err) in bundle.registry.failures() {
        eprintln!("model failed: id={id} [{}] {err}", err.kind());
    }
    if bundle.registry.healthy().is_empty() {
        anyhow::bail!("no usable models in {}", model_dir.display());
    }
    Ok(())
}
