//! Orchestrator: text → symbols → spectrograms → waveform → [denoised waveform].
//!
//! ```no_run
//! use std::path::Path;
//! use bertron_tts::{PipelineConfig, SynthesisOptions, TtsPipeline};
//!
//! let config = PipelineConfig::from_file(Path::new("models/pipeline.json")).unwrap();
//! let tts = TtsPipeline::load(&config).unwrap();
//! let out = tts.synthesize("A dog catching a frisbee.", &SynthesisOptions::default()).unwrap();
//! out.waveform.write_wav(Path::new("caption.wav")).unwrap();
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use crate::config::{AudioConfig, PipelineConfig, WaveGlowConfig};
use crate::denoiser::Denoiser;
use crate::error::{InputError, Result, StartupError};
use crate::normalizer::Normalizer;
use crate::spectrogram::Spectrograms;
use crate::synthesizer::{DecoderBackend, OnnxTacotron, Synthesizer};
use crate::vocoder::{OnnxWaveGlow, VocoderBackend, WaveGlow};
use crate::waveform::Waveform;

/// Per-request settings. `None` fields fall back to the pipeline's
/// [`SynthesisConfig`](crate::config::SynthesisConfig).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOptions {
    /// Return the mel-spectrograms and alignment alongside the audio.
    pub visualize: bool,
    pub denoise: Option<bool>,
    pub sigma: Option<f32>,
    pub denoise_strength: Option<f32>,
    /// Draw this request's noise from a fresh generator with this seed.
    pub seed: Option<u64>,
}

/// Result of one request.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub waveform: Waveform,
    /// Present iff [`SynthesisOptions::visualize`] was set.
    pub spectrograms: Option<Spectrograms>,
}

/// Loaded models; only ever used behind the pipeline's lock.
pub(crate) struct Engine {
    synthesizer: Synthesizer,
    vocoder: WaveGlow,
    denoiser: Denoiser,
    rng: StdRng,
}

/// A fully loaded TTS pipeline. `Send + Sync`; share it by reference or
/// `Arc`. Requests on one pipeline are serialized; use
/// [`TtsPool`](crate::TtsPool) to run several at once.
pub struct TtsPipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    engine: Mutex<Engine>,
}

impl TtsPipeline {
    /// Load every artifact named by `config`. Fails without side effects if
    /// any file is missing or the models do not fit together.
    pub fn load(config: &PipelineConfig) -> Result<Self, StartupError> {
        config.validate(Path::new("pipeline.json"))?;
        for path in config.artifact_paths() {
            if !path.is_file() {
                return Err(StartupError::MissingFile(path.to_path_buf()));
            }
        }

        let (waveglow_config, audio) = WaveGlowConfig::from_file(&config.waveglow.config)?;
        let tacotron = OnnxTacotron::load(&config.tacotron)?;
        let waveglow = OnnxWaveGlow::load(&config.waveglow.model, waveglow_config.n_group)?;

        Self::build(config.clone(), Box::new(tacotron), Box::new(waveglow), waveglow_config, audio)
    }

    /// Assemble a pipeline from already constructed backends.
    pub fn from_parts(
        config: PipelineConfig,
        decoder: Box<dyn DecoderBackend>,
        vocoder: Box<dyn VocoderBackend>,
        waveglow_config: WaveGlowConfig,
    ) -> Result<Self, StartupError> {
        config.validate(Path::new("pipeline.json"))?;
        waveglow_config.validate(Path::new("waveglow_config"))?;
        Self::build(config, decoder, vocoder, waveglow_config, None)
    }

    fn build(
        config: PipelineConfig,
        decoder: Box<dyn DecoderBackend>,
        vocoder: Box<dyn VocoderBackend>,
        waveglow_config: WaveGlowConfig,
        audio: Option<AudioConfig>,
    ) -> Result<Self, StartupError> {
        let normalizer = Normalizer::new(&config.text_cleaners, config.unknown_symbols)?;

        let mut synthesizer = Synthesizer::new(decoder, config.decoder.clone());
        synthesizer.probe()?;

        let mut vocoder = WaveGlow::new(
            vocoder,
            waveglow_config,
            audio.as_ref(),
            synthesizer.n_mel_channels(),
            config.sampling_rate,
        )?;

        let mut rng = match config.synthesis.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let denoiser = Denoiser::from_vocoder(&config.denoiser, &mut vocoder, &mut rng)?;

        info!(
            cleaners = ?config.text_cleaners,
            sampling_rate = config.sampling_rate,
            hop_length = vocoder.hop_length(),
            "TTS pipeline ready"
        );

        Ok(Self {
            config,
            normalizer,
            engine: Mutex::new(Engine { synthesizer, vocoder, denoiser, rng }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sampling_rate(&self) -> u32 {
        self.config.sampling_rate
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Turn `text` into speech. Stage errors are returned unchanged; nothing
    /// is retried and no partial audio is returned.
    pub fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Synthesis> {
        // the engine holds no per-request state, so a poisoned lock is safe to reuse
        let mut engine = self.engine.lock().unwrap_or_else(|p| p.into_inner());
        self.synthesize_locked(&mut engine, text, options)
    }

    /// The engine if no other request holds it.
    pub(crate) fn try_engine(&self) -> Option<MutexGuard<'_, Engine>> {
        match self.engine.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub(crate) fn lock_engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn synthesize_locked(
        &self,
        engine: &mut Engine,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Synthesis> {
        let started = Instant::now();
        let defaults = &self.config.synthesis;
        let sigma = options.sigma.unwrap_or(defaults.sigma);
        let denoise = options.denoise.unwrap_or(defaults.denoise);
        let strength = options.denoise_strength.unwrap_or(defaults.denoise_strength);
        if !(sigma >= 0.0) {
            return Err(InputError::InvalidOption(format!("sigma must be non-negative, got {sigma}")).into());
        }
        if !(strength >= 0.0) {
            return Err(
                InputError::InvalidOption(format!("denoise_strength must be non-negative, got {strength}")).into(),
            );
        }

        let symbols = self.normalizer.normalize(text)?;
        let spectrograms = engine.synthesizer.infer(&symbols)?;
        debug!(frames = spectrograms.frames(), truncated = spectrograms.truncated, "decoded");

        let audio = match options.seed {
            Some(seed) => {
                engine
                    .vocoder
                    .infer(&spectrograms.mel_postnet, sigma, &mut StdRng::seed_from_u64(seed))?
            }
            None => engine.vocoder.infer(&spectrograms.mel_postnet, sigma, &mut engine.rng)?,
        };
        let samples = if denoise { engine.denoiser.denoise(&audio, strength) } else { audio };
        let waveform = Waveform::new(samples, self.config.sampling_rate);

        info!(
            symbols = symbols.len(),
            frames = spectrograms.frames(),
            samples = waveform.len(),
            seconds = waveform.duration_secs(),
            denoise,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesized"
        );

        Ok(Synthesis {
            waveform,
            spectrograms: options.visualize.then_some(spectrograms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_pipeline_is_shareable() {
        assert_send_sync::<TtsPipeline>();
    }

    #[test]
    fn test_default_options_defer_to_config() {
        let o = SynthesisOptions::default();
        assert!(!o.visualize);
        assert_eq!(o.denoise, None);
        assert_eq!(o.sigma, None);
        assert_eq!(o.seed, None);
    }

    #[test]
    fn test_load_reports_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
            "tacotron": { "encoder": "e.onnx", "decoder": "d.onnx", "postnet": "p.onnx" },
            "waveglow": { "model": "w.onnx", "config": "w.json" }
        }"#;
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, json).unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();

        let err = TtsPipeline::load(&config).err().unwrap();
        assert!(
            matches!(err, StartupError::MissingFile(ref p) if p.ends_with("e.onnx")),
            "got {err:?}"
        );
    }
}
