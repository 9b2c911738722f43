//! voxfrag Inference Core
//!
//! Rotation-augmented ensemble inference and fragment ranking on Candle.
//! One growing point in, a ranked fragment library out.
//!
//! # Features
//! - Two augmentation strategies: 48 cached reflections/permutations, or a
//!   fresh random rotation with re-voxelization per variant
//! - Batched, strictly sequential model calls with progress events
//! - Out-of-memory failures surfaced as a typed, recoverable error
//! - Cosine-similarity ranking against a fingerprint library, CSV export
//! - GPU support (CUDA, Metal) with automatic fallback to CPU
//!
//! # Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxfrag_infer::{FingerprintLibrary, FragmentPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let library = FingerprintLibrary::load("fingerprints.json", &candle_core::Device::Cpu)?;
//!     let pipeline = FragmentPipeline::new(config, model, Arc::new(library), voxelizer)?;
//!
//!     let report = pipeline.run(&input, None).await?;
//!     print!("{}", report.to_csv()?);
//!
//!     Ok(())
//! }
//! ```

pub mod augment;
pub mod batch;
pub mod config;
pub mod device;
pub mod error;
pub mod library;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod rotation;
pub mod runner;
pub mod scoring;

pub use augment::{AugmentationKind, AugmentationStrategy, GridTransform, ReflectionSchedule};
pub use batch::{RotationBudget, TensorBatch, TensorBatchGenerator, VariantSource};
pub use config::PipelineConfig;
pub use error::{InferError, Result};
pub use library::FingerprintLibrary;
pub use model::{model_fn, FnModel, FragmentModel};
pub use pipeline::FragmentPipeline;
pub use progress::{InferenceProgress, ProgressSink};
pub use report::{render_csv, PipelineReport};
pub use rotation::{hamilton_product, random_unit_quaternion, rotate_coordinates, Quaternion};
pub use runner::{EnsembleRun, InferenceRunner};
pub use scoring::{aggregate, score, Embedding, FragmentScorer, RankedResult, ScoredFragment};
