//! The trained model seam: tensor in, tensor out.

use candle_core::Tensor;

/// A trained fragment-embedding model.
///
/// `predict` takes a `[batch, channels, w, w, w]` tensor and returns a
/// `[batch, fingerprint_dim]` tensor. Implementations may keep internal
/// buffers between calls; the runner never calls `predict` concurrently.
pub trait FragmentModel: Send + Sync {
    fn predict(&self, batch: &Tensor) -> candle_core::Result<Tensor>;

    fn name(&self) -> &str {
        "fragment-model"
    }
}

/// Adapter turning a closure into a [`FragmentModel`].
pub struct FnModel<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a model.
pub fn model_fn<F>(name: impl Into<String>, f: F) -> FnModel<F>
where
    F: Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync,
{
    FnModel { name: name.into(), f }
}

impl<F> FragmentModel for FnModel<F>
where
    F: Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync,
{
    fn predict(&self, batch: &Tensor) -> candle_core::Result<Tensor> {
        (self.f)(batch)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
