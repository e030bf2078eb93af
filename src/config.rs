//! Pipeline configuration: `pipeline.json` and the WaveGlow hyperparameter file.
//!
//! Every field except the artifact paths has a default matching the
//! pretrained Tacotron 2 / WaveGlow release, so a minimal config only names
//! the files:
//!
//! ```json
//! {
//!   "tacotron": { "encoder": "encoder.onnx", "decoder": "decoder_iter.onnx", "postnet": "postnet.onnx" },
//!   "waveglow": { "model": "waveglow.onnx", "config": "waveglow_config.json" }
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding `pipeline.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cleaners::Cleaner;
use crate::error::StartupError;

/// Default output sampling rate of the pretrained models.
pub const DEFAULT_SAMPLING_RATE: u32 = 22_050;

// ─────────────────────────────────────────────────────────────────────────────
// pipeline.json
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub tacotron: TacotronConfig,
    pub waveglow: WaveGlowPaths,

    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,

    /// Cleaner pipeline, applied in order.
    #[serde(default = "default_cleaners")]
    pub text_cleaners: Vec<String>,

    #[serde(default)]
    pub unknown_symbols: UnknownSymbolPolicy,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub denoiser: DenoiserConfig,
}

/// Tacotron 2 graphs plus the dimensions needed to seed the decoder state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacotronConfig {
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    pub postnet: PathBuf,

    #[serde(default = "default_n_mel_channels")]
    pub n_mel_channels: usize,
    #[serde(default = "default_rnn_dim")]
    pub attention_rnn_dim: usize,
    #[serde(default = "default_rnn_dim")]
    pub decoder_rnn_dim: usize,
    #[serde(default = "default_encoder_embedding_dim")]
    pub encoder_embedding_dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveGlowPaths {
    /// ONNX export of the reversed flow.
    pub model: PathBuf,
    /// JSON file with a `waveglow_config` section.
    pub config: PathBuf,
}

/// What to do with characters outside the symbol vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownSymbolPolicy {
    /// Skip them silently.
    #[default]
    Drop,
    /// Fail with [`InputError::UnknownSymbols`](crate::InputError::UnknownSymbols).
    Reject,
}

/// Behaviour when the decoder hits `max_decoder_steps` without stopping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxStepsPolicy {
    #[default]
    Fail,
    /// Keep the frames decoded so far and flag the result as truncated.
    Truncate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_gate_threshold")]
    pub gate_threshold: f32,
    #[serde(default = "default_max_decoder_steps")]
    pub max_decoder_steps: usize,
    #[serde(default)]
    pub on_max_steps: MaxStepsPolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            gate_threshold: default_gate_threshold(),
            max_decoder_steps: default_max_decoder_steps(),
            on_max_steps: MaxStepsPolicy::default(),
        }
    }
}

/// Per-request defaults; each can be overridden through
/// [`SynthesisOptions`](crate::SynthesisOptions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_sigma")]
    pub sigma: f32,
    #[serde(default = "default_true")]
    pub denoise: bool,
    #[serde(default = "default_denoise_strength")]
    pub denoise_strength: f32,
    /// Seed for the engine's noise generator. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sigma: default_sigma(),
            denoise: true,
            denoise_strength: default_denoise_strength(),
            seed: None,
        }
    }
}

/// Input used to estimate the vocoder bias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasMode {
    #[default]
    Zeros,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiserConfig {
    #[serde(default)]
    pub mode: BiasMode,
    #[serde(default = "default_filter_length")]
    pub filter_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_filter_length")]
    pub win_length: usize,
}

impl Default for DenoiserConfig {
    fn default() -> Self {
        Self {
            mode: BiasMode::default(),
            filter_length: default_filter_length(),
            hop_length: default_hop_length(),
            win_length: default_filter_length(),
        }
    }
}

fn default_sampling_rate() -> u32 { DEFAULT_SAMPLING_RATE }
fn default_cleaners() -> Vec<String> { vec!["english_cleaners".to_string()] }
fn default_n_mel_channels() -> usize { 80 }
fn default_rnn_dim() -> usize { 1024 }
fn default_encoder_embedding_dim() -> usize { 512 }
fn default_gate_threshold() -> f32 { 0.5 }
fn default_max_decoder_steps() -> usize { 1000 }
fn default_sigma() -> f32 { 0.666 }
fn default_denoise_strength() -> f32 { 0.01 }
fn default_filter_length() -> usize { 1024 }
fn default_hop_length() -> usize { 256 }
fn default_true() -> bool { true }

impl PipelineConfig {
    /// Read, resolve and validate a `pipeline.json`.
    pub fn from_file(path: &Path) -> Result<Self, StartupError> {
        let bytes = read_file(path)?;
        let mut config: PipelineConfig = serde_json::from_slice(&bytes)
            .map_err(|e| StartupError::config(path, e))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate(path)?;
        Ok(config)
    }

    /// Make every relative artifact path relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for p in [
            &mut self.tacotron.encoder,
            &mut self.tacotron.decoder,
            &mut self.tacotron.postnet,
            &mut self.waveglow.model,
            &mut self.waveglow.config,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    /// All artifact paths, in load order.
    pub fn artifact_paths(&self) -> [&Path; 5] {
        [
            &self.tacotron.encoder,
            &self.tacotron.decoder,
            &self.tacotron.postnet,
            &self.waveglow.model,
            &self.waveglow.config,
        ]
    }

    /// Check value ranges and cleaner names. `origin` names the file in errors.
    pub fn validate(&self, origin: &Path) -> Result<(), StartupError> {
        let fail = |msg: String| Err(StartupError::config(origin, msg));

        if self.sampling_rate == 0 {
            return fail("sampling_rate must be positive".into());
        }
        if self.text_cleaners.is_empty() {
            return fail("text_cleaners must name at least one cleaner".into());
        }
        for name in &self.text_cleaners {
            Cleaner::from_name(name)?;
        }
        let g = self.decoder.gate_threshold;
        if !(g > 0.0 && g < 1.0) {
            return fail(format!("gate_threshold must be in (0, 1), got {g}"));
        }
        if self.decoder.max_decoder_steps == 0 {
            return fail("max_decoder_steps must be positive".into());
        }
        if self.tacotron.n_mel_channels == 0 {
            return fail("n_mel_channels must be positive".into());
        }
        if !(self.synthesis.sigma >= 0.0) {
            return fail(format!("sigma must be non-negative, got {}", self.synthesis.sigma));
        }
        if !(self.synthesis.denoise_strength >= 0.0) {
            return fail(format!(
                "denoise_strength must be non-negative, got {}",
                self.synthesis.denoise_strength
            ));
        }
        let d = &self.denoiser;
        if d.hop_length == 0 || d.filter_length == 0 {
            return fail("denoiser filter_length and hop_length must be positive".into());
        }
        if d.win_length == 0 || d.win_length > d.filter_length {
            return fail(format!(
                "denoiser win_length must be in 1..={}, got {}",
                d.filter_length, d.win_length
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WaveGlow hyperparameters
// ─────────────────────────────────────────────────────────────────────────────

/// Architecture hyperparameters of the flow (`waveglow_config`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveGlowConfig {
    pub n_mel_channels: usize,
    pub n_flows: usize,
    pub n_group: usize,
    pub n_early_every: usize,
    pub n_early_size: usize,
    #[serde(rename = "WN_config")]
    pub wn_config: WnConfig,
}

/// Per-flow WaveNet-like coupling network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WnConfig {
    pub n_layers: usize,
    pub n_channels: usize,
    pub kernel_size: usize,
}

/// Audio front-end the vocoder was trained with (`data_config`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sampling_rate: u32,
    #[serde(default = "default_filter_length")]
    pub filter_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_filter_length")]
    pub win_length: usize,
    #[serde(default = "default_n_mel_channels")]
    pub n_mel_channels: usize,
}

#[derive(Debug, Deserialize)]
struct WaveGlowFile {
    waveglow_config: WaveGlowConfig,
    #[serde(default)]
    data_config: Option<AudioConfig>,
}

impl WaveGlowConfig {
    /// Parse the `waveglow_config` (and optional `data_config`) sections.
    pub fn from_file(path: &Path) -> Result<(Self, Option<AudioConfig>), StartupError> {
        let bytes = read_file(path)?;
        let file: WaveGlowFile =
            serde_json::from_slice(&bytes).map_err(|e| StartupError::config(path, e))?;
        file.waveglow_config.validate(path)?;
        Ok((file.waveglow_config, file.data_config))
    }

    /// Channels of `z` left after all early outputs have been emitted.
    /// `None` when the early outputs overrun `n_group` or `n_early_every` is 0.
    pub fn n_remaining_channels(&self) -> Option<usize> {
        if self.n_early_every == 0 {
            return None;
        }
        let mut remaining = self.n_group;
        for k in 0..self.n_flows {
            if k % self.n_early_every == 0 && k > 0 {
                remaining = remaining.checked_sub(self.n_early_size)?;
            }
        }
        Some(remaining)
    }

    pub fn validate(&self, origin: &Path) -> Result<(), StartupError> {
        let fail = |msg: String| Err(StartupError::config(origin, msg));

        if self.n_group == 0 || self.n_group % 2 != 0 {
            return fail(format!("n_group must be positive and even, got {}", self.n_group));
        }
        if self.n_flows == 0 {
            return fail("n_flows must be positive".into());
        }
        if self.n_early_every == 0 {
            return fail("n_early_every must be positive".into());
        }
        if self.n_mel_channels == 0 {
            return fail("n_mel_channels must be positive".into());
        }
        match self.n_remaining_channels() {
            Some(r) if r > 0 && r % 2 == 0 => Ok(()),
            other => fail(format!(
                "early outputs leave {:?} channels of n_group {}; need a positive even count",
                other, self.n_group
            )),
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, StartupError> {
    if !path.is_file() {
        return Err(StartupError::MissingFile(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| StartupError::Io { path: path.to_path_buf(), source })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "tacotron": { "encoder": "enc.onnx", "decoder": "dec.onnx", "postnet": "post.onnx" },
        "waveglow": { "model": "wg.onnx", "config": "/abs/wg.json" }
    }"#;

    const WAVEGLOW: &str = r#"{
        "train_config": { "epochs": 100000 },
        "data_config": { "sampling_rate": 22050, "filter_length": 1024, "hop_length": 256,
                         "win_length": 1024, "n_mel_channels": 80 },
        "waveglow_config": {
            "n_mel_channels": 80, "n_flows": 12, "n_group": 8,
            "n_early_every": 4, "n_early_size": 2,
            "WN_config": { "n_layers": 8, "n_channels": 256, "kernel_size": 3 }
        }
    }"#;

    #[test]
    fn test_defaults_fill_minimal_config() {
        let cfg: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.sampling_rate, 22_050);
        assert_eq!(cfg.text_cleaners, vec!["english_cleaners"]);
        assert_eq!(cfg.unknown_symbols, UnknownSymbolPolicy::Drop);
        assert_eq!(cfg.decoder.max_decoder_steps, 1000);
        assert_eq!(cfg.decoder.on_max_steps, MaxStepsPolicy::Fail);
        assert!((cfg.synthesis.sigma - 0.666).abs() < 1e-6);
        assert!(cfg.synthesis.denoise, "denoise must default to on");
        assert!((cfg.synthesis.denoise_strength - 0.01).abs() < 1e-6);
        assert_eq!(cfg.tacotron.n_mel_channels, 80);
        assert_eq!(cfg.denoiser.hop_length, 256);
        cfg.validate(Path::new("pipeline.json")).unwrap();
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let mut cfg: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.resolve_paths(Path::new("/models/taco"));
        assert_eq!(cfg.tacotron.encoder, Path::new("/models/taco/enc.onnx"));
        assert_eq!(cfg.waveglow.model, Path::new("/models/taco/wg.onnx"));
        assert_eq!(cfg.waveglow.config, Path::new("/abs/wg.json"));
    }

    #[test]
    fn test_unknown_cleaner_is_startup_error() {
        let mut cfg: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.text_cleaners = vec!["french_cleaners".into()];
        let err = cfg.validate(Path::new("pipeline.json")).unwrap_err();
        assert!(matches!(err, StartupError::UnknownCleaner(ref n) if n == "french_cleaners"));
    }

    #[test]
    fn test_gate_threshold_range() {
        let mut cfg: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.decoder.gate_threshold = 1.5;
        assert!(cfg.validate(Path::new("pipeline.json")).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, StartupError::MissingFile(_)));
    }

    #[test]
    fn test_waveglow_config_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveglow.json");
        std::fs::write(&path, WAVEGLOW).unwrap();
        let (wg, data) = WaveGlowConfig::from_file(&path).unwrap();
        assert_eq!(wg.n_group, 8);
        assert_eq!(wg.wn_config.n_channels, 256);
        // flows 4 and 8 each emit 2 early channels
        assert_eq!(wg.n_remaining_channels(), Some(4));
        assert_eq!(data.unwrap().hop_length, 256);
    }

    #[test]
    fn test_waveglow_rejects_exhausted_channels() {
        let wg = WaveGlowConfig {
            n_mel_channels: 80,
            n_flows: 12,
            n_group: 4,
            n_early_every: 4,
            n_early_size: 2,
            wn_config: WnConfig { n_layers: 8, n_channels: 256, kernel_size: 3 },
        };
        assert_eq!(wg.n_remaining_channels(), Some(0));
        assert!(wg.validate(Path::new("wg.json")).is_err());
    }

    #[test]
    fn test_waveglow_zero_early_every_is_none() {
        let wg = WaveGlowConfig {
            n_mel_channels: 80,
            n_flows: 12,
            n_group: 8,
            n_early_every: 0,
            n_early_size: 2,
            wn_config: WnConfig { n_layers: 8, n_channels: 256, kernel_size: 3 },
        };
        assert_eq!(wg.n_remaining_channels(), None);
        assert!(wg.validate(Path::new("wg.json")).is_err());
    }
}
