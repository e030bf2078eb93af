//! Error taxonomy for the TTS pipeline.
//!
//! ```text
//! TtsError
//! ├── Input(InputError)          -- text the normalizer cannot turn into symbols
//! ├── Synthesis(SynthesisError)  -- a model stage failed while serving a request
//! └── Startup(StartupError)      -- artifacts missing, unreadable or incompatible
//! ```
//!
//! Stage functions return their own error type; the orchestrator converts to
//! [`TtsError`] with `?` and never swallows a failure.

use std::path::PathBuf;

use thiserror::Error;

/// Any failure surfaced by [`TtsPipeline`](crate::TtsPipeline).
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("startup error: {0}")]
    Startup(#[from] StartupError),
}

pub type Result<T, E = TtsError> = std::result::Result<T, E>;

/// Malformed or out-of-vocabulary text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("utterance is empty after cleaning")]
    Empty,

    #[error("utterance contains characters outside the vocabulary: {chars:?}")]
    UnknownSymbols { chars: String },

    #[error("unknown ARPAbet phone '{phone}'")]
    UnknownPhone { phone: String },

    #[error("unclosed '{{' in utterance")]
    UnclosedBrace,

    #[error("invalid request option: {0}")]
    InvalidOption(String),
}

/// A model stage failed on a particular request.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("decoder reached {max_steps} steps without a stop signal")]
    DecoderLimit { max_steps: usize },

    #[error("mel-spectrogram has no frames; nothing to vocode")]
    EmptySpectrogram,

    #[error("{stage} failed: {message}")]
    Backend { stage: &'static str, message: String },

    #[error("{stage} returned {actual} values, expected {expected}")]
    Shape {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl SynthesisError {
    pub fn backend(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend { stage, message: err.to_string() }
    }
}

/// The pipeline could not be constructed. Fatal: never serve with a
/// partially loaded model.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("cannot load model {}: {message}", path.display())]
    Model { path: PathBuf, message: String },

    #[error("model artifacts are incompatible: {0}")]
    Incompatible(String),

    #[error("unknown text cleaner '{0}'")]
    UnknownCleaner(String),
}

impl StartupError {
    pub(crate) fn config(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Config { path: path.into(), message: message.to_string() }
    }
}
