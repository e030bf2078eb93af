//! HuggingFace Hub model downloader.
//!
//! Downloads `pipeline.json` and every artifact it names from a
//! HuggingFace repository, then loads a [`TtsPipeline`] from the local copies.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use tracing::info;

use crate::config::PipelineConfig;
use crate::pipeline::TtsPipeline;

/// Name of the pipeline configuration inside a repository.
pub const CONFIG_FILE: &str = "pipeline.json";

/// Download a single file from a HuggingFace repository.
fn hf_download(repo: &ApiRepo, repo_id: &str, filename: &str) -> Result<PathBuf> {
    repo.get(filename)
        .with_context(|| format!("Failed to download '{}' from '{}'", filename, repo_id))
}

/// Fetch `pipeline.json` and its artifacts. Returns the config with every
/// artifact path pointing into the local HuggingFace cache.
pub fn fetch_from_hub(repo_id: &str) -> Result<PipelineConfig> {
    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;
    let repo = api.model(repo_id.to_string());

    info!(repo = repo_id, "downloading pipeline config");
    let config_path = hf_download(&repo, repo_id, CONFIG_FILE)?;
    let bytes = std::fs::read(&config_path)
        .with_context(|| format!("Cannot read config: {}", config_path.display()))?;
    let mut config: PipelineConfig =
        serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", CONFIG_FILE))?;

    for path in [
        &mut config.tacotron.encoder,
        &mut config.tacotron.decoder,
        &mut config.tacotron.postnet,
        &mut config.waveglow.model,
        &mut config.waveglow.config,
    ] {
        let filename = repo_filename(path)?;
        info!(file = %filename, "downloading artifact");
        *path = hf_download(&repo, repo_id, &filename)?;
    }

    config.validate(&config_path)?;
    Ok(config)
}

/// Download and load a pipeline. Files are cached in the HuggingFace Hub
/// cache directory (`~/.cache/huggingface/hub` by default).
///
/// ```no_run
/// let tts = bertron_tts::download::load_from_hub("my-org/tacotron2-waveglow").unwrap();
/// ```
pub fn load_from_hub(repo_id: &str) -> Result<TtsPipeline> {
    let config = fetch_from_hub(repo_id)?;
    info!(repo = repo_id, "loading pipeline");
    TtsPipeline::load(&config).with_context(|| format!("Failed to load pipeline from '{}'", repo_id))
}

/// Artifact paths in a hub config are repository-relative, `/`-separated.
fn repo_filename(path: &Path) -> Result<String> {
    anyhow::ensure!(
        path.is_relative(),
        "artifact path {} must be relative to the repository root",
        path.display()
    );
    let parts = path
        .components()
        .map(|c| c.as_os_str().to_str().context("artifact path is not valid UTF-8"))
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_filename() {
        assert_eq!(repo_filename(Path::new("encoder.onnx")).unwrap(), "encoder.onnx");
        assert_eq!(repo_filename(Path::new("onnx/decoder_iter.onnx")).unwrap(), "onnx/decoder_iter.onnx");
        assert!(repo_filename(Path::new("/abs/waveglow.onnx")).is_err());
    }
}
