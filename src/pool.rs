//! Several independently loaded pipelines serving requests in parallel.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{Result, StartupError};
use crate::pipeline::{Synthesis, SynthesisOptions, TtsPipeline};

/// Dispatches each request to an idle pipeline; when all are busy, waits
/// on one picked round-robin.
pub struct TtsPool {
    pipelines: Vec<TtsPipeline>,
    next: AtomicUsize,
}

impl TtsPool {
    /// Load `workers` copies of the models described by `config`.
    pub fn load(config: &PipelineConfig, workers: usize) -> Result<Self, StartupError> {
        let pipelines = (0..workers)
            .map(|_| TtsPipeline::load(config))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_pipelines(pipelines)
    }

    pub fn from_pipelines(pipelines: Vec<TtsPipeline>) -> Result<Self, StartupError> {
        if pipelines.is_empty() {
            return Err(StartupError::Incompatible("a pool needs at least one pipeline".into()));
        }
        Ok(Self { pipelines, next: AtomicUsize::new(0) })
    }

    pub fn workers(&self) -> usize {
        self.pipelines.len()
    }

    pub fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Synthesis> {
        for (i, pipeline) in self.pipelines.iter().enumerate() {
            if let Some(mut engine) = pipeline.try_engine() {
                debug!(worker = i, "dispatch");
                return pipeline.synthesize_locked(&mut engine, text, options);
            }
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.pipelines.len();
        debug!(worker = i, "all workers busy; waiting");
        let pipeline = &self.pipelines[i];
        let mut engine = pipeline.lock_engine();
        pipeline.synthesize_locked(&mut engine, text, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_rejected() {
        assert!(TtsPool::from_pipelines(Vec::new()).is_err());
    }

    #[test]
    fn test_pool_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TtsPool>();
    }
}
