//! Bounded-size batching of augmented tensors.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::augment::AugmentationStrategy;
use crate::{InferError, Result};

/// Reference cap on tensors per model call, chosen to bound peak memory.
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Total number of augmented variants a run evaluates. Always ≥ 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "usize")]
pub struct RotationBudget(usize);

impl RotationBudget {
    pub fn new(requested: i64) -> Result<Self> {
        if requested <= 0 {
            return Err(InferError::InvalidBudget(requested));
        }
        Ok(Self(requested as usize))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl TryFrom<i64> for RotationBudget {
    type Error = InferError;

    fn try_from(value: i64) -> Result<Self> {
        RotationBudget::new(value)
    }
}

impl From<RotationBudget> for usize {
    fn from(budget: RotationBudget) -> usize {
        budget.0
    }
}

/// Anything that can hand out one `[channels, w, w, w]` tensor at a time.
pub trait VariantSource {
    fn make_new_variant(&mut self) -> Result<Tensor>;
}

impl VariantSource for AugmentationStrategy {
    fn make_new_variant(&mut self) -> Result<Tensor> {
        AugmentationStrategy::make_new_variant(self)
    }
}

/// One batch of `[1, channels, w, w, w]` tensors ready to concatenate.
#[derive(Debug)]
pub struct TensorBatch {
    tensors: Vec<Tensor>,
    /// Emission index of the first tensor in this batch.
    start: usize,
}

impl TensorBatch {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Join into a single `[batch, channels, w, w, w]` model input.
    pub fn concat(&self) -> Result<Tensor> {
        Ok(Tensor::cat(&self.tensors, 0)?)
    }
}

/// Pull-based generator of bounded batches.
///
/// Never emits more than the budget; once exhausted, [`get_batch`]
/// returns `None`.
///
/// [`get_batch`]: TensorBatchGenerator::get_batch
pub struct TensorBatchGenerator<S = AugmentationStrategy> {
    source: S,
    budget: RotationBudget,
    max_batch_size: usize,
    emitted: usize,
}

impl<S: VariantSource> TensorBatchGenerator<S> {
    pub fn new(source: S, budget: RotationBudget, max_batch_size: usize) -> Self {
        Self {
            source,
            budget,
            max_batch_size: max_batch_size.max(1),
            emitted: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.emitted < self.budget.get()
    }

    /// Next batch at the configured size cap.
    pub fn next_batch(&mut self) -> Result<Option<TensorBatch>> {
        self.get_batch(self.max_batch_size)
    }

    /// Collect up to `max_batch_size` variants, stopping early at the budget.
    pub fn get_batch(&mut self, max_batch_size: usize) -> Result<Option<TensorBatch>> {
        let cap = max_batch_size.max(1);
        let start = self.emitted;
        let mut tensors = Vec::with_capacity(cap.min(self.remaining()));

        while self.has_next() && tensors.len() < cap {
            let variant = self.source.make_new_variant()?;
            tensors.push(variant.unsqueeze(0)?);
            self.emitted += 1;
        }

        if tensors.is_empty() {
            return Ok(None);
        }

        debug!(
            batch = tensors.len(),
            emitted = self.emitted,
            budget = self.budget.get(),
            "Tensor batch ready"
        );
        Ok(Some(TensorBatch { tensors, start }))
    }

    /// Number of variants emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn remaining(&self) -> usize {
        self.budget.get() - self.emitted
    }

    pub fn budget(&self) -> RotationBudget {
        self.budget
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
