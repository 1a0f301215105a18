//! Pure similarity kernels operating on flat numeric buffers.
//!
//! This module provides the stateless numeric core shared by every search
//! backend:
//! - Cosine similarity and Euclidean distance over `f64` slices
//! - Batched many-query × many-item scoring into a row-major matrix
//! - Bounded top-K selection with multi-way merging of partial results
//!
//! Backends differ only in how they schedule these kernels; the arithmetic
//! here is the single source of truth, which is what makes the sequential
//! backend a valid oracle for the parallel one.

pub mod simd;
pub mod topk;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XystonError};

/// Distance metrics for vector similarity calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// Cosine similarity, range [-1, 1], higher is more similar.
    #[default]
    Cosine,
    /// Euclidean (L2) distance, lower is more similar.
    Euclidean,
}

/// Whether larger or smaller scores indicate a better match.
///
/// Top-K selection and result ordering consult this flag instead of
/// hard-coding a sort direction, so distance metrics rank correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreOrder {
    /// Similarity metrics: sort descending.
    HigherIsBetter,
    /// Distance metrics: sort ascending.
    LowerIsBetter,
}

impl ScoreOrder {
    /// True if `candidate` ranks strictly better than `incumbent`.
    #[inline]
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ScoreOrder::HigherIsBetter => candidate > incumbent,
            ScoreOrder::LowerIsBetter => candidate < incumbent,
        }
    }
}

impl DistanceMetric {
    /// Score two equal-length vectors with this metric.
    ///
    /// For `Cosine` the result is the similarity in [-1, 1]; a zero vector on
    /// either side scores exactly 0.0 rather than NaN. This is a deliberate
    /// edge-case policy: a zero embedding is "equally unlike everything",
    /// not an error.
    pub fn score(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        if a.len() != b.len() {
            return Err(XystonError::invalid_argument(format!(
                "vector dimensions must match: {} vs {}",
                a.len(),
                b.len()
            )));
        }

        let result = match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::Euclidean => simd::squared_l2_distance(a, b).sqrt(),
        };

        Ok(result)
    }

    /// Score two slices whose lengths are already known to match.
    ///
    /// Hot-loop variant used by backends after catalog/query dimensions have
    /// been validated once up front.
    #[inline]
    pub(crate) fn score_unchecked(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::Euclidean => simd::squared_l2_distance(a, b).sqrt(),
        }
    }

    /// The ranking direction for scores produced by this metric.
    pub fn score_order(&self) -> ScoreOrder {
        match self {
            DistanceMetric::Cosine => ScoreOrder::HigherIsBetter,
            DistanceMetric::Euclidean => ScoreOrder::LowerIsBetter,
        }
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            _ => Err(XystonError::invalid_argument(format!(
                "unknown distance metric: {s}"
            ))),
        }
    }
}

/// Cosine similarity with the zero-norm policy applied.
#[inline]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let (dot, norm_a_sq, norm_b_sq) = simd::dot_and_norms(a, b);
    if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
        return 0.0;
    }
    dot / (norm_a_sq.sqrt() * norm_b_sq.sqrt())
}

/// Score `n_queries` query vectors against `n_items` catalog vectors.
///
/// Both inputs are flat row-major buffers of `dim`-sized rows. The output is
/// row-major as well: `out[q * n_items + i]` is the score of query `q`
/// against item `i`.
pub fn batch_scores(
    queries: &[f64],
    items: &[f64],
    dim: usize,
    metric: DistanceMetric,
) -> Result<Vec<f64>> {
    if dim == 0 {
        return Err(XystonError::invalid_argument("dimension must be non-zero"));
    }
    if queries.len() % dim != 0 || items.len() % dim != 0 {
        return Err(XystonError::invalid_argument(format!(
            "buffer lengths must be multiples of dim {dim}"
        )));
    }

    let n_queries = queries.len() / dim;
    let n_items = items.len() / dim;
    let mut out = vec![0.0; n_queries * n_items];

    for q in 0..n_queries {
        let query = &queries[q * dim..(q + 1) * dim];
        let row = &mut out[q * n_items..(q + 1) * n_items];
        for (i, slot) in row.iter_mut().enumerate() {
            let item = &items[i * dim..(i + 1) * dim];
            *slot = match metric {
                DistanceMetric::Cosine => cosine_similarity(query, item),
                DistanceMetric::Euclidean => simd::squared_l2_distance(query, item).sqrt(),
            };
        }
    }

    Ok(out)
}
