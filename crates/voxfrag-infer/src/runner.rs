//! Batched inference over the augmented variants.
//!
//! The runner pulls one batch at a time from a [`TensorBatchGenerator`],
//! concatenates it, calls the model, keeps only the model output, and
//! drops the input tensors before asking for the next batch. Between
//! batches it yields to the host scheduler so progress stays observable.
//!
//! A failed model call ends the run immediately. The failure is recorded
//! in the returned [`EnsembleRun`] next to whatever was accumulated;
//! [`EnsembleRun::into_outputs`] turns it into a typed error so callers
//! cannot rank a partial ensemble by accident.

use std::time::{Duration, Instant};

use candle_core::Tensor;
use tracing::{debug, info, warn};

use crate::batch::{TensorBatchGenerator, VariantSource};
use crate::model::FragmentModel;
use crate::progress::{InferenceProgress, ProgressSink};
use crate::{InferError, Result};

/// Result of driving a generator to exhaustion (or to the first failure).
#[derive(Debug)]
pub struct EnsembleRun {
    /// Raw model outputs, one `[batch, dim]` tensor per successful batch,
    /// in emission order.
    pub outputs: Vec<Tensor>,
    /// Variants whose batch was successfully predicted.
    pub completed: usize,
    /// Successful model calls.
    pub batches: usize,
    pub budget: usize,
    /// Model error message if a prediction failed.
    pub failure: Option<String>,
}

impl EnsembleRun {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.completed == self.budget
    }

    /// The accumulated outputs, or `InferenceResourceExhausted` if a model
    /// call failed.
    pub fn into_outputs(self) -> Result<Vec<Tensor>> {
        match self.failure {
            Some(reason) => Err(InferError::InferenceResourceExhausted {
                completed: self.completed,
                budget: self.budget,
                reason,
            }),
            None => Ok(self.outputs),
        }
    }
}

/// Drives batched, strictly sequential model calls.
#[derive(Debug, Clone)]
pub struct InferenceRunner {
    yield_delay: Duration,
}

impl Default for InferenceRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl InferenceRunner {
    /// `yield_delay` is slept between batches; zero just yields the task.
    pub fn new(yield_delay: Duration) -> Self {
        Self { yield_delay }
    }

    pub fn yield_delay(&self) -> Duration {
        self.yield_delay
    }

    /// Run the model over every batch the generator produces.
    ///
    /// Generator errors (voxelization, tensor shaping) propagate as `Err`.
    /// Model errors do not; they end the loop and are reported through
    /// [`EnsembleRun::failure`].
    pub async fn run<S: VariantSource>(
        &self,
        model: &dyn FragmentModel,
        generator: &mut TensorBatchGenerator<S>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<EnsembleRun> {
        let t0 = Instant::now();
        let budget = generator.budget().get();
        let mut run = EnsembleRun {
            outputs: Vec::new(),
            completed: 0,
            batches: 0,
            budget,
            failure: None,
        };

        while generator.has_next() {
            let Some(batch) = generator.next_batch()? else {
                break;
            };
            let batch_len = batch.len();
            let input = batch.concat()?;
            drop(batch);

            let prediction = model.predict(&input);
            drop(input);

            match prediction {
                Ok(output) => {
                    run.outputs.push(output);
                    run.completed += batch_len;
                    run.batches += 1;
                }
                Err(e) => {
                    warn!(
                        model = model.name(),
                        completed = run.completed,
                        budget,
                        "Prediction failed, most likely due to insufficient memory: {}",
                        e
                    );
                    run.failure = Some(e.to_string());
                    break;
                }
            }

            let update = InferenceProgress::new(run.completed, budget);
            debug!(completed = run.completed, budget, "{}", update.message());
            if let Some(sink) = progress {
                sink.report(&update);
            }

            if generator.has_next() {
                self.pause().await;
            }
        }

        info!(
            variants = run.completed,
            batches = run.batches,
            failed = run.failure.is_some(),
            "Ensemble inference finished in {:.2}ms",
            t0.elapsed().as_secs_f64() * 1000.0
        );
        Ok(run)
    }

    async fn pause(&self) {
        if self.yield_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.yield_delay).await;
        }
    }
}
