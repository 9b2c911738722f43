//! Error types for the inference core.

use thiserror::Error;
use voxfrag_common::GridError;

pub type Result<T> = std::result::Result<T, InferError>;

#[derive(Error, Debug)]
pub enum InferError {
    #[error("Invalid rotation budget: {0} (must be at least 1)")]
    InvalidBudget(i64),

    #[error("Inference failed after {completed}/{budget} variants, most likely due to insufficient memory: {reason}")]
    InferenceResourceExhausted {
        completed: usize,
        budget: usize,
        reason: String,
    },

    #[error("Cannot aggregate an empty ensemble")]
    EmptyEnsemble,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("Unexpected model output: {0}")]
    ModelOutput(String),

    #[error("Fingerprint library error: {0}")]
    Library(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl InferError {
    /// Host-facing hint for recoverable failures.
    ///
    /// Only `InferenceResourceExhausted` has one; a UI may show it in place
    /// of the raw error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            InferError::InferenceResourceExhausted { budget, .. } if *budget > 1 => Some(format!(
                "You might consider reducing the number of grid rotations used for inference (currently {budget})."
            )),
            InferError::InferenceResourceExhausted { .. } => {
                Some("You may need to use a more powerful computer.".to_string())
            }
            _ => None,
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, InferError::InferenceResourceExhausted { .. })
    }
}

impl From<candle_core::Error> for InferError {
    fn from(e: candle_core::Error) -> Self {
        InferError::Tensor(e.to_string())
    }
}

impl From<csv::Error> for InferError {
    fn from(e: csv::Error) -> Self {
        InferError::Csv(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_mentions_current_rotations() {
        let err = InferError::InferenceResourceExhausted {
            completed: 4,
            budget: 32,
            reason: "out of memory".into(),
        };
        let hint = err.suggestion().unwrap();
        assert!(hint.contains("currently 32"), "{hint}");
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn test_single_rotation_suggests_bigger_machine() {
        let err = InferError::InferenceResourceExhausted {
            completed: 0,
            budget: 1,
            reason: "out of memory".into(),
        };
        assert_eq!(err.suggestion().unwrap(), "You may need to use a more powerful computer.");
    }

    #[test]
    fn test_other_errors_have_no_suggestion() {
        assert!(InferError::EmptyEnsemble.suggestion().is_none());
        assert!(InferError::InvalidBudget(0).suggestion().is_none());
    }
}
