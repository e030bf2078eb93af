//! Synthesize one utterance to a WAV file.
//!
//! Usage:
//!   bertron-tts --config models/pipeline.json --text "A cat on a mat." --output cat.wav
//!   bertron-tts --hub my-org/tacotron2-waveglow --text "Hello world." --intermediates hello.npz
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bertron_tts::{npz, PipelineConfig, SynthesisOptions, TtsPipeline};

#[derive(Parser, Debug)]
#[command(version, about = "Tacotron 2 + WaveGlow text-to-speech")]
struct Args {
    /// Path to pipeline.json
    #[arg(long, short, required_unless_present = "hub", conflicts_with = "hub")]
    config: Option<PathBuf>,

    /// HuggingFace repository holding pipeline.json and the models
    #[arg(long)]
    hub: Option<String>,

    /// Text to speak
    #[arg(long, short)]
    text: String,

    /// WAV file to write
    #[arg(long, short, default_value = "output.wav")]
    output: PathBuf,

    /// Skip vocoder bias removal
    #[arg(long)]
    no_denoise: bool,

    /// Standard deviation of the vocoder's input noise
    #[arg(long)]
    sigma: Option<f32>,

    /// Denoiser strength
    #[arg(long)]
    strength: Option<f32>,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Also save mel, post-net mel and alignment to this .npz file
    #[arg(long)]
    intermediates: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let tts = match (&args.config, &args.hub) {
        (Some(path), _) => {
            let config = PipelineConfig::from_file(path)
                .with_context(|| format!("Cannot load config {}", path.display()))?;
            TtsPipeline::load(&config).context("Cannot load pipeline")?
        }
        (None, Some(repo)) => bertron_tts::download::load_from_hub(repo)?,
        (None, None) => unreachable!("clap requires --config or --hub"),
    };

    let options = SynthesisOptions {
        visualize: args.intermediates.is_some(),
        denoise: args.no_denoise.then_some(false),
        sigma: args.sigma,
        denoise_strength: args.strength,
        seed: args.seed,
    };

    info!(text = %args.text, "synthesizing");
    let synthesis = tts.synthesize(&args.text, &options)?;
    synthesis.waveform.write_wav(&args.output)?;

    if let (Some(path), Some(spectrograms)) = (&args.intermediates, &synthesis.spectrograms) {
        npz::save_spectrograms(path, spectrograms)?;
    }
    Ok(())
}
