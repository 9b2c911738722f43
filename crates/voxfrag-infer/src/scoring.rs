//! Ensemble aggregation and cosine-similarity ranking.

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::library::FingerprintLibrary;
use crate::{InferError, Result};

/// Reference floor for `|fingerprint| · |embedding|`.
pub const DEFAULT_COSINE_EPSILON: f32 = 1e-6;

/// A fixed-length model embedding (one output row or an ensemble mean).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Every component multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Embedding {
        Embedding(self.0.iter().map(|v| v * factor).collect())
    }

    fn check_finite(&self) -> Result<()> {
        match self.0.iter().position(|v| !v.is_finite()) {
            Some(i) => Err(InferError::ModelOutput(format!(
                "embedding component {i} is not finite ({})",
                self.0[i]
            ))),
            None => Ok(()),
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Embedding(values)
    }
}

/// Element-wise mean of every row of every model output.
///
/// Each output is `[batch, dim]` (a bare `[dim]` counts as one row); all
/// must agree on `dim`.
pub fn aggregate(outputs: &[Tensor]) -> Result<Embedding> {
    let mut rows = Vec::with_capacity(outputs.len());
    let mut dim = None;

    for output in outputs {
        let output = match output.rank() {
            1 => output.unsqueeze(0)?,
            2 => output.clone(),
            rank => {
                return Err(InferError::ModelOutput(format!(
                    "expected [batch, dim] output, got rank {rank} with shape {:?}",
                    output.dims()
                )))
            }
        };
        let (n, d) = output.dims2()?;
        match dim {
            None => dim = Some(d),
            Some(expected) if expected != d => {
                return Err(InferError::EmbeddingDimensionMismatch { expected, actual: d });
            }
            Some(_) => {}
        }
        if n > 0 {
            rows.push(output.to_dtype(DType::F64)?);
        }
    }

    if rows.is_empty() {
        return Err(InferError::EmptyEnsemble);
    }

    // f64 accumulation keeps the sum of large rows from overflowing.
    let mean = Tensor::cat(&rows, 0)?.mean(0)?;
    let embedding = Embedding(mean.to_vec1::<f64>()?.into_iter().map(|v| v as f32).collect());
    embedding.check_finite()?;
    Ok(embedding)
}

/// One ranked fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub smiles: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Fragments ordered by descending score; ties keep library order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedResult(Vec<ScoredFragment>);

impl RankedResult {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[ScoredFragment] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredFragment> {
        self.0.iter()
    }

    /// The best `k` fragments (fewer if the library is smaller).
    pub fn top(&self, k: usize) -> &[ScoredFragment] {
        &self.0[..k.min(self.0.len())]
    }

    pub fn best(&self) -> Option<&ScoredFragment> {
        self.0.first()
    }

    pub fn into_vec(self) -> Vec<ScoredFragment> {
        self.0
    }
}

impl<'a> IntoIterator for &'a RankedResult {
    type Item = &'a ScoredFragment;
    type IntoIter = std::slice::Iter<'a, ScoredFragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Ranks a fingerprint library against an embedding.
#[derive(Debug, Clone, Copy)]
pub struct FragmentScorer {
    epsilon: f32,
}

impl Default for FragmentScorer {
    fn default() -> Self {
        Self::new(DEFAULT_COSINE_EPSILON)
    }
}

impl FragmentScorer {
    pub fn new(epsilon: f32) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Cosine similarity of every library fingerprint to `embedding`, in
    /// library order. Every score lies in `[-1, 1]`.
    ///
    /// Computed in f64 so that squares of any finite f32 input stay finite.
    pub fn similarities(&self, embedding: &Embedding, library: &FingerprintLibrary) -> Result<Vec<f32>> {
        if embedding.len() != library.dimension() {
            return Err(InferError::EmbeddingDimensionMismatch {
                expected: library.dimension(),
                actual: embedding.len(),
            });
        }
        embedding.check_finite()?;

        let fingerprints = library.matrix().to_dtype(DType::F64)?;
        let query = Tensor::from_slice(embedding.as_slice(), (1, embedding.len()), fingerprints.device())?
            .to_dtype(DType::F64)?;

        // (a · b) / max(|a| |b|, ε)
        let dot = fingerprints.broadcast_mul(&query)?.sum(1)?;
        let fp_norms = fingerprints.sqr()?.sum(1)?.sqrt()?;
        let query_norm = query.sqr()?.sum_all()?.sqrt()?.to_scalar::<f64>()?;
        let denom = fp_norms
            .affine(query_norm, 0.0)?
            .clamp(f64::from(self.epsilon), f64::MAX)?;

        let cosines = dot.div(&denom)?.to_vec1::<f64>()?;
        Ok(cosines
            .into_iter()
            .map(|c| {
                let c = c.clamp(-1.0, 1.0) as f32;
                // -0.0 must tie with 0.0 under total_cmp.
                if c == 0.0 {
                    0.0
                } else {
                    c
                }
            })
            .collect())
    }

    /// Rank the whole library, best first. The sort is stable.
    pub fn score(&self, embedding: &Embedding, library: &FingerprintLibrary) -> Result<RankedResult> {
        let similarities = self.similarities(embedding, library)?;

        let mut ranked: Vec<ScoredFragment> = library
            .smiles()
            .iter()
            .zip(similarities)
            .map(|(smiles, score)| ScoredFragment { smiles: smiles.clone(), score })
            .collect();
        sort_descending(&mut ranked);

        if let Some(best) = ranked.first() {
            debug!(fragments = ranked.len(), best = %best.smiles, score = best.score, "Library ranked");
        }
        Ok(RankedResult(ranked))
    }
}

/// Stable, descending by score under `f32::total_cmp`.
fn sort_descending(fragments: &mut [ScoredFragment]) {
    fragments.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Rank with the default epsilon.
pub fn score(embedding: &Embedding, library: &FingerprintLibrary) -> Result<RankedResult> {
    FragmentScorer::default().score(embedding, library)
}
