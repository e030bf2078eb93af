//! ONNX Runtime plumbing shared by the Tacotron 2 and WaveGlow runners.

use std::path::Path;

use ort::{session::Session, value::DynValue};

use crate::error::{StartupError, SynthesisError};

/// Load one graph. A missing file is reported before ORT sees the path.
pub(crate) fn load_session(path: &Path) -> Result<Session, StartupError> {
    if !path.is_file() {
        return Err(StartupError::MissingFile(path.to_path_buf()));
    }
    let model_err = |message: String| StartupError::Model { path: path.to_path_buf(), message };
    let session = Session::builder()
        .map_err(|e| model_err(e.to_string()))?
        .commit_from_file(path)
        .map_err(|e| model_err(e.to_string()))?;
    tracing::info!(model = %path.display(), "loaded ONNX graph");
    Ok(session)
}

/// Copy a named `f32` output out of the session, together with its shape.
pub(crate) fn extract_f32(
    value: Option<&DynValue>,
    name: &str,
    stage: &'static str,
) -> Result<(Vec<usize>, Vec<f32>), SynthesisError> {
    let value = value.ok_or_else(|| SynthesisError::backend(stage, format!("graph has no output '{name}'")))?;
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| SynthesisError::backend(stage, format!("output '{name}': {e}")))?;
    let shape = shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok((shape, data.to_vec()))
}

/// [`extract_f32`] that also checks the element count.
pub(crate) fn extract_f32_len(
    value: Option<&DynValue>,
    name: &str,
    stage: &'static str,
    expected: usize,
) -> Result<Vec<f32>, SynthesisError> {
    let (_, data) = extract_f32(value, name, stage)?;
    if data.len() != expected {
        return Err(SynthesisError::Shape { stage, expected, actual: data.len() });
    }
    Ok(data)
}
