//! Removes the vocoder's bias: the faint constant hiss WaveGlow produces
//! even for silent input.
//!
//! The bias spectrum is measured once at load by vocoding a silent (or
//! standard-normal) mel with zero noise. Denoising subtracts a scaled copy
//! of it from every STFT frame's magnitude and resynthesizes with the
//! original phase.

use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::config::{BiasMode, DenoiserConfig};
use crate::error::StartupError;
use crate::spectrogram::Matrix;
use crate::stft::Stft;
use crate::vocoder::WaveGlow;

/// Length of the mel used to estimate the bias.
pub const BIAS_FRAMES: usize = 88;

pub struct Denoiser {
    stft: Stft,
    bias: Vec<f32>,
}

impl Denoiser {
    /// Build from a waveform the vocoder produced for silent input. The
    /// magnitude of its first STFT frame becomes the bias spectrum.
    pub fn from_bias_audio(config: &DenoiserConfig, bias_audio: &[f32]) -> Result<Self, StartupError> {
        if bias_audio.is_empty() {
            return Err(StartupError::Incompatible("vocoder returned no audio for the bias mel".into()));
        }
        let stft = Stft::new(config.filter_length, config.hop_length, config.win_length);
        let spec = stft.forward(bias_audio);
        let bias = spec.magnitude_frame(0).to_vec();
        Ok(Self { stft, bias })
    }

    /// Measure the bias by running `vocoder` with sigma 0.
    pub fn from_vocoder<R: Rng>(
        config: &DenoiserConfig,
        vocoder: &mut WaveGlow,
        rng: &mut R,
    ) -> Result<Self, StartupError> {
        let n_mel = vocoder.config().n_mel_channels;
        let mel = match config.mode {
            BiasMode::Zeros => Matrix::zeros(n_mel, BIAS_FRAMES),
            BiasMode::Normal => {
                let data = (0..n_mel * BIAS_FRAMES).map(|_| rng.sample::<f32, _>(StandardNormal)).collect();
                Matrix::from_vec(data, n_mel, BIAS_FRAMES)
                    .ok_or_else(|| StartupError::Incompatible("bias mel has the wrong size".into()))?
            }
        };
        let audio = vocoder
            .infer(&mel, 0.0, rng)
            .map_err(|e| StartupError::Incompatible(format!("denoiser bias run: {e}")))?;
        let denoiser = Self::from_bias_audio(config, &audio)?;
        debug!(
            mode = ?config.mode,
            bias_peak = denoiser.bias.iter().copied().fold(0.0f32, f32::max),
            "denoiser bias measured"
        );
        Ok(denoiser)
    }

    /// Bias magnitude per frequency bin.
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Subtract `strength · bias` from every frame's magnitude, clamped at 0.
    /// The output has the same length as `audio`.
    pub fn denoise(&self, audio: &[f32], strength: f32) -> Vec<f32> {
        if audio.is_empty() {
            return Vec::new();
        }
        let mut spec = self.stft.forward(audio);
        for frame in spec.magnitude.chunks_mut(spec.bins) {
            for (m, &b) in frame.iter_mut().zip(&self.bias) {
                *m = (*m - b * strength).max(0.0);
            }
        }
        self.stft.inverse(&spec, audio.len())
    }
}
