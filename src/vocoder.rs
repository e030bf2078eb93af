//! WaveGlow vocoder: mel-spectrogram → waveform by running the flow in
//! reverse from Gaussian noise.
//!
//! The reversed flow is exported as one ONNX graph with inputs
//! `mel [1, n_mel, frames]` and `z [1, n_group, frames·hop / n_group]` and a
//! single output `audio [1, frames·hop]`. Sampling `z` happens here so the
//! random stream is seedable and identical across runtimes.

use std::path::Path;

use ort::{session::Session, value::Tensor};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::{AudioConfig, WaveGlowConfig};
use crate::error::{StartupError, SynthesisError};
use crate::onnx::{extract_f32_len, load_session};
use crate::spectrogram::MelSpectrogram;

/// Samples produced per mel frame (the STFT hop the mels were computed with).
pub const DEFAULT_HOP_LENGTH: usize = 256;

const STAGE: &str = "waveglow";

/// Runs the reversed flow for a given mel and noise tensor.
pub trait VocoderBackend: Send {
    /// `z` has `n_group · frames · hop / n_group` values laid out
    /// `[n_group, frames·hop/n_group]`. Returns the audio samples.
    fn infer(&mut self, mel: &MelSpectrogram, z: &[f32]) -> Result<Vec<f32>, SynthesisError>;
}

/// WaveGlow over ONNX Runtime.
pub struct OnnxWaveGlow {
    session: Session,
    n_group: usize,
}

impl OnnxWaveGlow {
    pub fn load(model: &Path, n_group: usize) -> Result<Self, StartupError> {
        Ok(Self { session: load_session(model)?, n_group })
    }
}

impl VocoderBackend for OnnxWaveGlow {
    fn infer(&mut self, mel: &MelSpectrogram, z: &[f32]) -> Result<Vec<f32>, SynthesisError> {
        let (n_mel, frames) = mel.shape();
        let z_cols = z.len() / self.n_group;
        let mel_t = Tensor::<f32>::from_array(([1usize, n_mel, frames], mel.as_slice().to_vec()))
            .map_err(|e| SynthesisError::backend(STAGE, e))?;
        let z_t = Tensor::<f32>::from_array(([1usize, self.n_group, z_cols], z.to_vec()))
            .map_err(|e| SynthesisError::backend(STAGE, e))?;

        let outputs = self
            .session
            .run(ort::inputs!["mel" => mel_t, "z" => z_t])
            .map_err(|e| SynthesisError::backend(STAGE, e))?;
        extract_f32_len(outputs.get("audio"), "audio", STAGE, z.len())
    }
}

/// Vocoder front: validated hyperparameters plus noise sampling.
pub struct WaveGlow {
    backend: Box<dyn VocoderBackend>,
    config: WaveGlowConfig,
    hop_length: usize,
}

impl WaveGlow {
    /// Check `config` against the synthesizer's mel width and the pipeline's
    /// output rate. `audio` is the optional `data_config` section.
    pub fn new(
        backend: Box<dyn VocoderBackend>,
        config: WaveGlowConfig,
        audio: Option<&AudioConfig>,
        n_mel_channels: usize,
        sampling_rate: u32,
    ) -> Result<Self, StartupError> {
        if config.n_mel_channels != n_mel_channels {
            return Err(StartupError::Incompatible(format!(
                "WaveGlow expects {} mel channels, Tacotron 2 produces {}",
                config.n_mel_channels, n_mel_channels
            )));
        }
        let hop_length = audio.map_or(DEFAULT_HOP_LENGTH, |a| a.hop_length);
        if let Some(a) = audio {
            if a.sampling_rate != sampling_rate {
                return Err(StartupError::Incompatible(format!(
                    "WaveGlow was trained at {} Hz, pipeline is configured for {} Hz",
                    a.sampling_rate, sampling_rate
                )));
            }
            if a.n_mel_channels != n_mel_channels {
                return Err(StartupError::Incompatible(format!(
                    "WaveGlow data_config has {} mel channels, Tacotron 2 produces {}",
                    a.n_mel_channels, n_mel_channels
                )));
            }
        }
        if hop_length == 0 || hop_length.checked_rem(config.n_group) != Some(0) {
            return Err(StartupError::Incompatible(format!(
                "hop_length {} is not a multiple of n_group {}",
                hop_length, config.n_group
            )));
        }
        Ok(Self { backend, config, hop_length })
    }

    pub fn config(&self) -> &WaveGlowConfig {
        &self.config
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Number of samples produced for `frames` mel frames.
    pub fn output_len(&self, frames: usize) -> usize {
        frames * self.hop_length
    }

    /// Synthesize audio from `mel` with noise `z ~ N(0, sigma²)` drawn from `rng`.
    pub fn infer<R: Rng>(
        &mut self,
        mel: &MelSpectrogram,
        sigma: f32,
        rng: &mut R,
    ) -> Result<Vec<f32>, SynthesisError> {
        let (n_mel, frames) = mel.shape();
        if frames == 0 {
            return Err(SynthesisError::EmptySpectrogram);
        }
        if n_mel != self.config.n_mel_channels {
            return Err(SynthesisError::Shape {
                stage: STAGE,
                expected: self.config.n_mel_channels,
                actual: n_mel,
            });
        }

        let len = self.output_len(frames);
        let z: Vec<f32> = if sigma == 0.0 {
            vec![0.0; len]
        } else {
            (0..len).map(|_| sigma * rng.sample::<f32, _>(StandardNormal)).collect()
        };

        let audio = self.backend.infer(mel, &z)?;
        if audio.len() != len {
            return Err(SynthesisError::Shape { stage: STAGE, expected: len, actual: audio.len() });
        }
        Ok(audio)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WnConfig;
    use crate::spectrogram::Matrix;
    use rand::{rngs::StdRng, SeedableRng};

    /// Returns the noise unchanged.
    struct PassNoise;

    impl VocoderBackend for PassNoise {
        fn infer(&mut self, _mel: &MelSpectrogram, z: &[f32]) -> Result<Vec<f32>, SynthesisError> {
            Ok(z.to_vec())
        }
    }

    fn wg_config(n_mel: usize) -> WaveGlowConfig {
        WaveGlowConfig {
            n_mel_channels: n_mel,
            n_flows: 12,
            n_group: 8,
            n_early_every: 4,
            n_early_size: 2,
            wn_config: WnConfig { n_layers: 8, n_channels: 256, kernel_size: 3 },
        }
    }

    fn audio(rate: u32, hop: usize) -> AudioConfig {
        AudioConfig { sampling_rate: rate, filter_length: 1024, hop_length: hop, win_length: 1024, n_mel_channels: 80 }
    }

    #[test]
    fn test_output_length_and_noise_scale() {
        let mut wg = WaveGlow::new(Box::new(PassNoise), wg_config(80), None, 80, 22_050).unwrap();
        let mel = Matrix::zeros(80, 40);
        let mut rng = StdRng::seed_from_u64(7);
        let out = wg.infer(&mel, 0.5, &mut rng).unwrap();
        assert_eq!(out.len(), 40 * 256);
        let var = out.iter().map(|v| v * v).sum::<f32>() / out.len() as f32;
        assert!((var - 0.25).abs() < 0.02, "variance {var}");
    }

    #[test]
    fn test_zero_sigma_is_deterministic_zero_noise() {
        let mut wg = WaveGlow::new(Box::new(PassNoise), wg_config(80), None, 80, 22_050).unwrap();
        let out = wg.infer(&Matrix::zeros(80, 3), 0.0, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_same_seed_same_noise() {
        let mut wg = WaveGlow::new(Box::new(PassNoise), wg_config(80), None, 80, 22_050).unwrap();
        let mel = Matrix::zeros(80, 5);
        let a = wg.infer(&mel, 0.666, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = wg.infer(&mel, 0.666, &mut StdRng::seed_from_u64(42)).unwrap();
        let c = wg.infer(&mel, 0.666, &mut StdRng::seed_from_u64(43)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_spectrogram() {
        let mut wg = WaveGlow::new(Box::new(PassNoise), wg_config(80), None, 80, 22_050).unwrap();
        let err = wg.infer(&Matrix::zeros(80, 0), 0.666, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, SynthesisError::EmptySpectrogram));
    }

    #[test]
    fn test_incompatible_configs() {
        assert!(WaveGlow::new(Box::new(PassNoise), wg_config(64), None, 80, 22_050).is_err());
        assert!(WaveGlow::new(Box::new(PassNoise), wg_config(80), Some(&audio(16_000, 256)), 80, 22_050).is_err());
        assert!(WaveGlow::new(Box::new(PassNoise), wg_config(80), Some(&audio(22_050, 100)), 80, 22_050).is_err());

        let wg = WaveGlow::new(Box::new(PassNoise), wg_config(80), Some(&audio(22_050, 200)), 80, 22_050).unwrap();
        assert_eq!(wg.output_len(3), 600);
    }

    #[test]
    fn test_zero_n_group_is_incompatible() {
        let config = WaveGlowConfig { n_group: 0, ..wg_config(80) };
        let err = WaveGlow::new(Box::new(PassNoise), config, None, 80, 22_050).err().unwrap();
        assert!(matches!(err, StartupError::Incompatible(_)), "{err}");
    }

    #[test]
    fn test_backend_length_is_checked() {
        struct Short;
        impl VocoderBackend for Short {
            fn infer(&mut self, _: &MelSpectrogram, z: &[f32]) -> Result<Vec<f32>, SynthesisError> {
                Ok(vec![0.0; z.len() - 1])
            }
        }
        let mut wg = WaveGlow::new(Box::new(Short), wg_config(80), None, 80, 22_050).unwrap();
        let err = wg.infer(&Matrix::zeros(80, 2), 0.1, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, SynthesisError::Shape { expected: 512, actual: 511, .. }));
    }
}
