//! End-to-end orchestration: augment → batch → infer → aggregate → rank.
//!
//! A [`FragmentPipeline`] owns the long-lived collaborators (model,
//! fingerprint library, voxelizer, device) and may run any number of
//! times. Each run builds its own strategy and generator, so no cached
//! grid or schedule position leaks from one growing point to the next.

use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::Device;
use tracing::{info, instrument, warn};
use voxfrag_common::{GrowingPointInput, Voxelizer};

use crate::augment::AugmentationStrategy;
use crate::batch::TensorBatchGenerator;
use crate::config::PipelineConfig;
use crate::device::{device_label, select_device};
use crate::library::FingerprintLibrary;
use crate::model::FragmentModel;
use crate::progress::ProgressSink;
use crate::report::PipelineReport;
use crate::runner::InferenceRunner;
use crate::scoring::{aggregate, FragmentScorer};
use crate::{InferError, Result};

pub struct FragmentPipeline {
    config: PipelineConfig,
    model: Arc<dyn FragmentModel>,
    library: Arc<FingerprintLibrary>,
    voxelizer: Arc<dyn Voxelizer>,
    device: Device,
}

impl FragmentPipeline {
    /// Validate `config` and pick the tensor device.
    pub fn new(
        config: PipelineConfig,
        model: Arc<dyn FragmentModel>,
        library: Arc<FingerprintLibrary>,
        voxelizer: Arc<dyn Voxelizer>,
    ) -> Result<Self> {
        config.validate()?;
        let device = select_device(config.use_gpu)?;
        Ok(Self::with_device(config, model, library, voxelizer, device))
    }

    /// Use an explicit device. The config is not re-validated here; `run`
    /// still rejects a bad budget before touching the voxelizer.
    pub fn with_device(
        config: PipelineConfig,
        model: Arc<dyn FragmentModel>,
        library: Arc<FingerprintLibrary>,
        voxelizer: Arc<dyn Voxelizer>,
        device: Device,
    ) -> Self {
        Self { config, model, library, voxelizer, device }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn library(&self) -> &FingerprintLibrary {
        &self.library
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Rank the whole library for one growing point.
    ///
    /// Fails with `InvalidBudget` before any voxelization if the configured
    /// rotation count is not positive, and with `InferenceResourceExhausted`
    /// if any model call fails; no partial ranking is ever returned.
    #[instrument(skip(self, input, progress), fields(rotations = self.config.rotations, strategy = self.config.augmentation().as_str()))]
    pub async fn run(&self, input: &GrowingPointInput, progress: Option<&dyn ProgressSink>) -> Result<PipelineReport> {
        let t0 = Instant::now();
        let budget = self.config.budget()?;
        let kind = self.config.augmentation();

        let strategy = AugmentationStrategy::new(
            kind,
            Arc::clone(&self.voxelizer),
            input,
            self.config.grid,
            self.device.clone(),
            self.config.seed,
        )?;
        let mut generator = TensorBatchGenerator::new(strategy, budget, self.config.batch_size);

        let runner = InferenceRunner::new(Duration::from_millis(self.config.yield_delay_ms));
        let run = runner.run(self.model.as_ref(), &mut generator, progress).await?;
        let batches = run.batches;
        let outputs = run.into_outputs().inspect_err(|e| {
            if let Some(hint) = e.suggestion() {
                warn!("{}", hint);
            }
        })?;

        let embedding = aggregate(&outputs)?;
        drop(outputs);
        if embedding.len() != self.library.dimension() {
            return Err(InferError::EmbeddingDimensionMismatch {
                expected: self.library.dimension(),
                actual: embedding.len(),
            });
        }

        let ranked = FragmentScorer::new(self.config.cosine_epsilon).score(&embedding, &self.library)?;
        let duration_ms = t0.elapsed().as_millis() as u64;

        info!(
            fragments = ranked.len(),
            best = ranked.best().map(|f| f.smiles.as_str()).unwrap_or(""),
            duration_ms,
            "Fragment ranking complete"
        );

        Ok(PipelineReport {
            ranked: ranked.into_vec(),
            strategy: kind,
            rotations: budget.get(),
            batches,
            embedding_dim: embedding.len(),
            device: device_label(&self.device).to_string(),
            duration_ms,
        })
    }
}
