//! Tacotron 2 spectrogram synthesis: bounded autoregressive decoding.
//!
//! The network is split into three ONNX graphs (NVIDIA's export):
//!
//! | Graph          | Inputs                                                      | Outputs                             |
//! |----------------|-------------------------------------------------------------|-------------------------------------|
//! | `encoder`      | `sequences [1,T]` i64, `sequence_lengths [1]` i64           | `memory`, `processed_memory`        |
//! | `decoder_iter` | previous frame, RNN/attention state, memory, `mask [1,T]`   | `decoder_output`, `gate_prediction`, `out_*` state |
//! | `postnet`      | `mel_outputs [1,M,F]`                                       | `mel_outputs_postnet [1,M,F]`       |
//!
//! [`Synthesizer`] owns the loop and its stop predicate; a [`DecoderBackend`]
//! only runs single steps.

use ort::{session::Session, value::Tensor};
use tracing::{debug, warn};

use crate::config::{DecoderConfig, MaxStepsPolicy, TacotronConfig};
use crate::error::{StartupError, SynthesisError};
use crate::normalizer::SymbolSequence;
use crate::onnx::{extract_f32, extract_f32_len, load_session};
use crate::spectrogram::{Matrix, MelSpectrogram, Spectrograms};
use crate::symbols::char_to_id;

// ─────────────────────────────────────────────────────────────────────────────
// Backend seam
// ─────────────────────────────────────────────────────────────────────────────

/// Output of one decoder step.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderFrame {
    /// `n_mel_channels` values.
    pub mel: Vec<f32>,
    /// Stop-token logit; the frame is the last when `sigmoid(gate_logit)`
    /// exceeds the threshold.
    pub gate_logit: f32,
    /// Attention over the input symbols, one weight per symbol.
    pub attention: Vec<f32>,
}

/// Runs the network one step at a time. Implementations keep the recurrent
/// state between [`begin`](Self::begin) and the last [`step`](Self::step).
pub trait DecoderBackend: Send {
    fn n_mel_channels(&self) -> usize;

    /// Encode `symbols` and reset the decoder state.
    fn begin(&mut self, symbols: &SymbolSequence) -> Result<(), SynthesisError>;

    fn step(&mut self) -> Result<DecoderFrame, SynthesisError>;

    /// Refine the full raw mel. Output has the same shape as the input.
    fn postnet(&mut self, mel: &MelSpectrogram) -> Result<MelSpectrogram, SynthesisError>;
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        x.exp() / (1.0 + x.exp())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer
// ─────────────────────────────────────────────────────────────────────────────

pub struct Synthesizer {
    backend: Box<dyn DecoderBackend>,
    config: DecoderConfig,
}

impl Synthesizer {
    pub fn new(backend: Box<dyn DecoderBackend>, config: DecoderConfig) -> Self {
        Self { backend, config }
    }

    pub fn n_mel_channels(&self) -> usize {
        self.backend.n_mel_channels()
    }

    /// Decode `symbols` into raw mel, post-net mel and alignment.
    pub fn infer(&mut self, symbols: &SymbolSequence) -> Result<Spectrograms, SynthesisError> {
        let n_mel = self.n_mel_channels();
        let max_steps = self.config.max_decoder_steps;

        self.backend.begin(symbols)?;

        let mut mel_frames: Vec<Vec<f32>> = Vec::new();
        let mut attention_frames: Vec<Vec<f32>> = Vec::new();
        let mut stopped = false;

        for step in 0..max_steps {
            let frame = self.backend.step()?;
            if frame.mel.len() != n_mel {
                return Err(SynthesisError::Shape {
                    stage: "decoder",
                    expected: n_mel,
                    actual: frame.mel.len(),
                });
            }
            if frame.attention.len() != symbols.len() {
                return Err(SynthesisError::Shape {
                    stage: "attention",
                    expected: symbols.len(),
                    actual: frame.attention.len(),
                });
            }
            let p_stop = sigmoid(frame.gate_logit);
            mel_frames.push(frame.mel);
            attention_frames.push(frame.attention);

            if p_stop > self.config.gate_threshold {
                debug!(step, p_stop, "decoder stop");
                stopped = true;
                break;
            }
        }

        let truncated = !stopped;
        if truncated {
            match self.config.on_max_steps {
                MaxStepsPolicy::Fail => return Err(SynthesisError::DecoderLimit { max_steps }),
                MaxStepsPolicy::Truncate => {
                    warn!(max_steps, "decoder hit its step limit; output truncated")
                }
            }
        }

        let shape_err = |stage, expected, actual| SynthesisError::Shape { stage, expected, actual };
        let mel = Matrix::from_columns(&mel_frames, n_mel)
            .ok_or_else(|| shape_err("decoder", n_mel, 0))?;
        let alignment = Matrix::from_columns(&attention_frames, symbols.len())
            .ok_or_else(|| shape_err("attention", symbols.len(), 0))?;

        let mel_postnet = self.backend.postnet(&mel)?;
        if mel_postnet.shape() != mel.shape() {
            return Err(shape_err("postnet", mel.as_slice().len(), mel_postnet.as_slice().len()));
        }

        Ok(Spectrograms { mel, mel_postnet, alignment, truncated })
    }

    /// One-symbol, one-step run through every graph. Run at load so an
    /// incompatible export fails before the first request.
    pub fn probe(&mut self) -> Result<(), StartupError> {
        let incompatible = |e: SynthesisError| StartupError::Incompatible(format!("Tacotron 2 probe: {e}"));
        let n_mel = self.n_mel_channels();
        let symbols = SymbolSequence::new(vec![char_to_id('a').unwrap_or(1)]);

        self.backend.begin(&symbols).map_err(incompatible)?;
        let frame = self.backend.step().map_err(incompatible)?;
        if frame.mel.len() != n_mel || frame.attention.len() != 1 {
            return Err(StartupError::Incompatible(format!(
                "decoder step returned {} mel values and {} attention weights, expected {} and 1",
                frame.mel.len(),
                frame.attention.len(),
                n_mel
            )));
        }
        let mel = Matrix::from_columns(&[frame.mel], n_mel)
            .ok_or_else(|| StartupError::Incompatible("decoder frame has the wrong size".into()))?;
        let post = self.backend.postnet(&mel).map_err(incompatible)?;
        if post.shape() != mel.shape() {
            return Err(StartupError::Incompatible(format!(
                "postnet returned {:?}, expected {:?}",
                post.shape(),
                mel.shape()
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ONNX backend
// ─────────────────────────────────────────────────────────────────────────────

const ENCODER: &str = "encoder";
const DECODER: &str = "decoder_iter";
const POSTNET: &str = "postnet";

/// Recurrent state carried between decoder steps.
///
/// `memory`, `processed_memory` and `mask` are fixed for the utterance and
/// built once in `begin`; the graph only borrows them on each step.
struct DecoderState {
    len: usize,
    memory: Tensor<f32>,
    processed_memory: Tensor<f32>,
    mask: Tensor<bool>,
    decoder_input: Vec<f32>,
    attention_hidden: Vec<f32>,
    attention_cell: Vec<f32>,
    decoder_hidden: Vec<f32>,
    decoder_cell: Vec<f32>,
    attention_weights: Vec<f32>,
    attention_weights_cum: Vec<f32>,
    attention_context: Vec<f32>,
}

/// Tacotron 2 over ONNX Runtime.
pub struct OnnxTacotron {
    encoder: Session,
    decoder: Session,
    postnet: Session,
    dims: TacotronConfig,
    state: Option<DecoderState>,
}

impl OnnxTacotron {
    pub fn load(config: &TacotronConfig) -> Result<Self, StartupError> {
        Ok(Self {
            encoder: load_session(&config.encoder)?,
            decoder: load_session(&config.decoder)?,
            postnet: load_session(&config.postnet)?,
            dims: config.clone(),
            state: None,
        })
    }

    fn encode(&mut self, symbols: &SymbolSequence) -> Result<DecoderState, SynthesisError> {
        let len = symbols.len();
        let sequences = Tensor::<i64>::from_array(([1usize, len], symbols.ids().to_vec()))
            .map_err(|e| SynthesisError::backend(ENCODER, e))?;
        let lengths = Tensor::<i64>::from_array(([1usize], vec![len as i64]))
            .map_err(|e| SynthesisError::backend(ENCODER, e))?;

        let outputs = self
            .encoder
            .run(ort::inputs!["sequences" => sequences, "sequence_lengths" => lengths])
            .map_err(|e| SynthesisError::backend(ENCODER, e))?;

        let (mem_shape, memory) = extract_f32(outputs.get("memory"), "memory", ENCODER)?;
        let (proc_shape, processed_memory) =
            extract_f32(outputs.get("processed_memory"), "processed_memory", ENCODER)?;

        let memory_dim = match mem_shape.as_slice() {
            [1, t, d] if *t == len => *d,
            _ => {
                return Err(SynthesisError::backend(
                    ENCODER,
                    format!("memory has shape {mem_shape:?}, expected [1, {len}, _]"),
                ))
            }
        };
        let attention_dim = match proc_shape.as_slice() {
            [1, t, d] if *t == len => *d,
            _ => {
                return Err(SynthesisError::backend(
                    ENCODER,
                    format!("processed_memory has shape {proc_shape:?}, expected [1, {len}, _]"),
                ))
            }
        };
        if memory_dim != self.dims.encoder_embedding_dim {
            return Err(SynthesisError::Shape {
                stage: ENCODER,
                expected: self.dims.encoder_embedding_dim,
                actual: memory_dim,
            });
        }

        let (memory, processed_memory, mask) =
            utterance_inputs(len, memory, memory_dim, processed_memory, attention_dim)?;

        let d = &self.dims;
        Ok(DecoderState {
            len,
            memory,
            processed_memory,
            mask,
            decoder_input: vec![0.0; d.n_mel_channels],
            attention_hidden: vec![0.0; d.attention_rnn_dim],
            attention_cell: vec![0.0; d.attention_rnn_dim],
            decoder_hidden: vec![0.0; d.decoder_rnn_dim],
            decoder_cell: vec![0.0; d.decoder_rnn_dim],
            attention_weights: vec![0.0; len],
            attention_weights_cum: vec![0.0; len],
            attention_context: vec![0.0; d.encoder_embedding_dim],
        })
    }
}

/// Decoder inputs that stay fixed across every step of one utterance.
fn utterance_inputs(
    len: usize,
    memory: Vec<f32>,
    memory_dim: usize,
    processed_memory: Vec<f32>,
    attention_dim: usize,
) -> Result<(Tensor<f32>, Tensor<f32>, Tensor<bool>), SynthesisError> {
    let err = |e: ort::Error| SynthesisError::backend(ENCODER, e);
    let memory = Tensor::<f32>::from_array(([1usize, len, memory_dim], memory)).map_err(err)?;
    let processed_memory =
        Tensor::<f32>::from_array(([1usize, len, attention_dim], processed_memory)).map_err(err)?;
    // nothing is padded for a single utterance
    let mask = Tensor::<bool>::from_array(([1usize, len], vec![false; len])).map_err(err)?;
    Ok((memory, processed_memory, mask))
}

fn f32_tensor<const N: usize>(shape: [usize; N], data: Vec<f32>) -> Result<Tensor<f32>, SynthesisError> {
    Tensor::<f32>::from_array((shape, data)).map_err(|e| SynthesisError::backend(DECODER, e))
}

impl DecoderBackend for OnnxTacotron {
    fn n_mel_channels(&self) -> usize {
        self.dims.n_mel_channels
    }

    fn begin(&mut self, symbols: &SymbolSequence) -> Result<(), SynthesisError> {
        self.state = Some(self.encode(symbols)?);
        Ok(())
    }

    fn step(&mut self) -> Result<DecoderFrame, SynthesisError> {
        let n_mel = self.dims.n_mel_channels;
        let att_dim = self.dims.attention_rnn_dim;
        let dec_dim = self.dims.decoder_rnn_dim;
        let emb_dim = self.dims.encoder_embedding_dim;
        let s = self
            .state
            .as_mut()
            .ok_or_else(|| SynthesisError::backend(DECODER, "step called before begin"))?;
        let t = s.len;

        let outputs = self
            .decoder
            .run(ort::inputs![
                "decoder_input" => f32_tensor([1, n_mel], s.decoder_input.clone())?,
                "attention_hidden" => f32_tensor([1, att_dim], s.attention_hidden.clone())?,
                "attention_cell" => f32_tensor([1, att_dim], s.attention_cell.clone())?,
                "decoder_hidden" => f32_tensor([1, dec_dim], s.decoder_hidden.clone())?,
                "decoder_cell" => f32_tensor([1, dec_dim], s.decoder_cell.clone())?,
                "attention_weights" => f32_tensor([1, t], s.attention_weights.clone())?,
                "attention_weights_cum" => f32_tensor([1, t], s.attention_weights_cum.clone())?,
                "attention_context" => f32_tensor([1, emb_dim], s.attention_context.clone())?,
                "memory" => &s.memory,
                "processed_memory" => &s.processed_memory,
                "mask" => &s.mask
            ])
            .map_err(|e| SynthesisError::backend(DECODER, e))?;

        let mel = extract_f32_len(outputs.get("decoder_output"), "decoder_output", DECODER, n_mel)?;
        let gate = extract_f32_len(outputs.get("gate_prediction"), "gate_prediction", DECODER, 1)?;

        s.attention_hidden =
            extract_f32_len(outputs.get("out_attention_hidden"), "out_attention_hidden", DECODER, att_dim)?;
        s.attention_cell =
            extract_f32_len(outputs.get("out_attention_cell"), "out_attention_cell", DECODER, att_dim)?;
        s.decoder_hidden =
            extract_f32_len(outputs.get("out_decoder_hidden"), "out_decoder_hidden", DECODER, dec_dim)?;
        s.decoder_cell =
            extract_f32_len(outputs.get("out_decoder_cell"), "out_decoder_cell", DECODER, dec_dim)?;
        s.attention_weights =
            extract_f32_len(outputs.get("out_attention_weights"), "out_attention_weights", DECODER, t)?;
        s.attention_weights_cum = extract_f32_len(
            outputs.get("out_attention_weights_cum"),
            "out_attention_weights_cum",
            DECODER,
            t,
        )?;
        s.attention_context =
            extract_f32_len(outputs.get("out_attention_context"), "out_attention_context", DECODER, emb_dim)?;
        s.decoder_input = mel.clone();

        Ok(DecoderFrame {
            mel,
            gate_logit: gate[0],
            attention: s.attention_weights.clone(),
        })
    }

    fn postnet(&mut self, mel: &MelSpectrogram) -> Result<MelSpectrogram, SynthesisError> {
        let (n_mel, frames) = mel.shape();
        let input = Tensor::<f32>::from_array(([1usize, n_mel, frames], mel.as_slice().to_vec()))
            .map_err(|e| SynthesisError::backend(POSTNET, e))?;
        let outputs = self
            .postnet
            .run(ort::inputs!["mel_outputs" => input])
            .map_err(|e| SynthesisError::backend(POSTNET, e))?;
        let data = extract_f32_len(
            outputs.get("mel_outputs_postnet"),
            "mel_outputs_postnet",
            POSTNET,
            n_mel * frames,
        )?;
        Matrix::from_vec(data, n_mel, frames).ok_or(SynthesisError::Shape {
            stage: POSTNET,
            expected: n_mel * frames,
            actual: 0,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
