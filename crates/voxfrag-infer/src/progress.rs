//! Progress events emitted at every batch boundary.

use serde::Serialize;
use tokio::sync::broadcast;

/// Fraction of the rotation budget whose inference has completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceProgress {
    pub completed: usize,
    pub total: usize,
    pub fraction: f64,
}

impl InferenceProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        let fraction = if total == 0 { 1.0 } else { completed as f64 / total as f64 };
        Self { completed, total, fraction }
    }

    pub fn percent(&self) -> f64 {
        100.0 * self.fraction
    }

    /// User-facing status line, e.g. `Running inference (38%)...`.
    pub fn message(&self) -> String {
        format!("Running inference ({:.0}%)...", self.percent())
    }
}

/// Receiver of progress events. Must not block; it runs on the pipeline task.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &InferenceProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&InferenceProgress) + Send + Sync,
{
    fn report(&self, progress: &InferenceProgress) {
        self(progress)
    }
}

impl ProgressSink for broadcast::Sender<InferenceProgress> {
    fn report(&self, progress: &InferenceProgress) {
        // No subscribers is fine.
        let _ = self.send(*progress);
    }
}
