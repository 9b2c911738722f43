//! Ranked output rendering: the downloadable scores CSV and the run summary.

use serde::Serialize;

use crate::augment::AugmentationKind;
use crate::scoring::ScoredFragment;
use crate::{InferError, Result};

pub const CSV_HEADER: [&str; 3] = ["Rank", "Fragment SMILES", "Score"];

/// Render `Rank,Fragment SMILES,Score` rows, rank 1-based, score to 3 places
/// with `toFixed(3)` rounding.
pub fn render_csv(ranked: &[ScoredFragment]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(32 * (ranked.len() + 1)));

    writer.write_record(CSV_HEADER)?;
    for (i, fragment) in ranked.iter().enumerate() {
        let rank = (i + 1).to_string();
        let score = format_score(fragment.score);
        writer.write_record([rank.as_str(), fragment.smiles.as_str(), score.as_str()])?;
    }

    let bytes = writer.into_inner().map_err(|e| InferError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| InferError::Csv(e.to_string()))
}

/// Three decimals with JavaScript `Number.prototype.toFixed(3)` semantics:
/// exact ties round away from zero, tiny negatives print as `-0.000`, and
/// `-0` prints as `0.000`.
fn format_score(score: f32) -> String {
    let x = f64::from(score);
    // Exact for any f32 input: 24 + 10 significant bits fit in an f64.
    let scaled = x.abs() * 1000.0;
    if scaled.fract() != 0.5 {
        let x = if x == 0.0 { 0.0 } else { x };
        return format!("{x:.3}");
    }
    let n = scaled.ceil() as u64;
    let sign = if x < 0.0 { "-" } else { "" };
    format!("{sign}{}.{:03}", n / 1000, n % 1000)
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Fragments, best first.
    pub ranked: Vec<ScoredFragment>,
    pub strategy: AugmentationKind,
    /// Variants evaluated.
    pub rotations: usize,
    pub batches: usize,
    pub embedding_dim: usize,
    pub device: String,
    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn to_csv(&self) -> Result<String> {
        render_csv(&self.ranked)
    }

    pub fn top(&self, k: usize) -> &[ScoredFragment] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
