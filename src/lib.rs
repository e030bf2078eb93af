//! # bertron-tts
//!
//! Text-to-speech core of an image-captioning service: Tacotron 2 turns the
//! caption into a mel-spectrogram, WaveGlow turns that into audio, and a
//! spectral denoiser removes the vocoder's residual hiss. Both networks run
//! as ONNX graphs through ONNX Runtime.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use bertron_tts::{PipelineConfig, SynthesisOptions, TtsPipeline};
//!
//! let config = PipelineConfig::from_file(Path::new("models/pipeline.json")).unwrap();
//! let tts = TtsPipeline::load(&config).unwrap();
//!
//! let options = SynthesisOptions { visualize: true, seed: Some(1), ..Default::default() };
//! let out = tts.synthesize("Two dogs playing in the snow.", &options).unwrap();
//!
//! out.waveform.write_wav(Path::new("caption.wav")).unwrap();
//! if let Some(spectrograms) = &out.spectrograms {
//!     bertron_tts::npz::save_spectrograms(Path::new("caption.npz"), spectrograms).unwrap();
//! }
//! ```
//!
//! ## Pipeline
//! 1. **Cleaning**: named cleaners: ASCII, lowercase, numbers and
//!    abbreviations → spoken words.
//! 2. **Symbols**: characters and `{ARPAbet}` phones → vocabulary ids.
//! 3. **Tacotron 2**: encoder, then one `decoder_iter` run per frame until
//!    the gate fires or `max_decoder_steps` is reached, then the post-net.
//! 4. **WaveGlow**: post-net mel + `N(0, sigma²)` noise → audio.
//! 5. **Denoiser**: STFT magnitude minus the vocoder's bias spectrum.

// hf-hub needs a TLS stack that does not cross-compile to mobile targets.
#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub mod download;

pub mod cleaners;
pub mod config;
pub mod denoiser;
pub mod error;
pub mod normalizer;
pub mod npz;
pub mod numbers;
mod onnx;
pub mod pipeline;
pub mod pool;
pub mod spectrogram;
pub mod stft;
pub mod symbols;
pub mod synthesizer;
pub mod vocoder;
pub mod waveform;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::{PipelineConfig, DEFAULT_SAMPLING_RATE};
pub use error::{InputError, StartupError, SynthesisError, TtsError};
pub use normalizer::{Normalizer, SymbolSequence};
pub use pipeline::{Synthesis, SynthesisOptions, TtsPipeline};
pub use pool::TtsPool;
pub use spectrogram::{AlignmentMatrix, MelSpectrogram, Spectrograms};
pub use synthesizer::{DecoderBackend, DecoderFrame};
pub use vocoder::VocoderBackend;
pub use waveform::Waveform;
