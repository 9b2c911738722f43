//! Configuration for the inference pipeline.
//!
//! Reads `voxfrag.toml` from the current directory or the path in the
//! `VOXFRAG_CONFIG` env var. Every field has a default, so an empty file
//! (or no file at all) yields the reference deployment settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use voxfrag_common::GridShape;

use crate::augment::AugmentationKind;
use crate::batch::RotationBudget;
use crate::{InferError, Result};

pub const CONFIG_ENV_VAR: &str = "VOXFRAG_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "voxfrag.toml";

/// Configuration for one [`FragmentPipeline`](crate::FragmentPipeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of augmented grid variants evaluated per run (default: 32)
    #[serde(default = "default_rotations")]
    pub rotations: i64,

    /// Re-voxelize from a fresh random rotation for every variant instead of
    /// reflecting/permuting one cached grid (default: false)
    #[serde(default)]
    pub full_rotation_at_every_inference: bool,

    /// Maximum tensors per model call (default: 4)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Floor for the cosine-similarity denominator (default: 1e-6)
    #[serde(default = "default_cosine_epsilon")]
    pub cosine_epsilon: f32,

    /// Pause between batches so the host can redraw progress (default: 100ms)
    #[serde(default = "default_yield_delay_ms")]
    pub yield_delay_ms: u64,

    /// Voxel grid shape expected by the model
    #[serde(default)]
    pub grid: GridShape,

    /// Use GPU if available (default: false)
    #[serde(default)]
    pub use_gpu: bool,

    /// Seed for the full-rotation RNG; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_rotations() -> i64 { 32 }
fn default_batch_size() -> usize { 4 }
fn default_cosine_epsilon() -> f32 { 1e-6 }
fn default_yield_delay_ms() -> u64 { 100 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rotations: default_rotations(),
            full_rotation_at_every_inference: false,
            batch_size: default_batch_size(),
            cosine_epsilon: default_cosine_epsilon(),
            yield_delay_ms: default_yield_delay_ms(),
            grid: GridShape::default(),
            use_gpu: false,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading pipeline config from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `$VOXFRAG_CONFIG`, else `./voxfrag.toml`, else defaults.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Using config from {}={}", CONFIG_ENV_VAR, path);
            return Self::load(path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load(DEFAULT_CONFIG_FILE);
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        RotationBudget::new(self.rotations)?;
        if self.batch_size == 0 {
            return Err(InferError::Config("batch_size must be at least 1".to_string()));
        }
        if !(self.cosine_epsilon > 0.0) {
            return Err(InferError::Config(format!(
                "cosine_epsilon must be positive (got {})",
                self.cosine_epsilon
            )));
        }
        GridShape::new(self.grid.channels, self.grid.width)?;
        Ok(())
    }

    /// Which augmentation strategy this config selects.
    pub fn augmentation(&self) -> AugmentationKind {
        AugmentationKind::from_full_rotation(self.full_rotation_at_every_inference)
    }

    pub fn budget(&self) -> Result<RotationBudget> {
        RotationBudget::new(self.rotations)
    }

    /// Set the rotation budget.
    pub fn with_rotations(mut self, rotations: i64) -> Self {
        self.rotations = rotations;
        self
    }

    /// Select full random rotation (true) or reflections/permutations (false).
    pub fn with_full_rotation(mut self, enabled: bool) -> Self {
        self.full_rotation_at_every_inference = enabled;
        self
    }

    /// Set batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_grid(mut self, grid: GridShape) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_yield_delay_ms(mut self, delay_ms: u64) -> Self {
        self.yield_delay_ms = delay_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cosine_epsilon(mut self, epsilon: f32) -> Self {
        self.cosine_epsilon = epsilon;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = PipelineConfig::default();
        assert_eq!(config.rotations, 32);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.grid, GridShape { channels: 9, width: 24 });
        assert!((config.cosine_epsilon - 1e-6).abs() < f32::EPSILON);
        assert_eq!(config.augmentation(), AugmentationKind::Reflective);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.rotations, default_rotations());
        assert_eq!(config.yield_delay_ms, default_yield_delay_ms());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = PipelineConfig::from_toml_str(
            r#"
            rotations = 8
            full_rotation_at_every_inference = true
            seed = 7

            [grid]
            width = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.rotations, 8);
        assert_eq!(config.augmentation(), AugmentationKind::FullRotation);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.grid, GridShape { channels: 9, width: 16 });
    }

    #[test]
    fn test_non_positive_budget_rejected() {
        for bad in ["rotations = 0", "rotations = -3"] {
            match PipelineConfig::from_toml_str(bad) {
                Err(InferError::InvalidBudget(_)) => {}
                other => panic!("{bad}: expected InvalidBudget, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = PipelineConfig::default().with_batch_size(0);
        assert!(matches!(config.validate(), Err(InferError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rotations = 12\nbatch_size = 2").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.rotations, 12);
        assert_eq!(config.batch_size, 2);
    }
}
