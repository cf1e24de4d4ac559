//! Core trait definition for vector index implementations.
//!
//! Every vector algorithm (FLAT, HNSW) implements `VectorIndex` so the query
//! executor can treat them uniformly.

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;

use crate::cancel::{check_every, CancelToken};
use crate::error::{Result, TesseraError};
use crate::index::distance::compute_distance;
use crate::types::DistanceMetric;

/// Trait that all vector index implementations must satisfy.
///
/// Indexes are mutated only under the owning search index's write lock, so
/// `insert`/`remove` take `&mut self` and searches take `&self`.
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Insert or replace the vector of `doc_id`.
    ///
    /// # Errors
    /// Returns `TesseraError::DimensionMismatch` if the vector length differs
    /// from the index dimension. Nothing is inserted in that case.
    fn insert(&mut self, doc_id: u32, vector: &[f32]) -> Result<()>;

    /// Remove the vector of `doc_id`. Returns `false` if it was not indexed.
    fn remove(&mut self, doc_id: u32) -> bool;

    /// Approximate (or exact, for FLAT) nearest neighbors of `query`.
    ///
    /// # Arguments
    /// * `query`  - The query vector (must match index dimensionality).
    /// * `k`      - Number of neighbors wanted.
    /// * `ef`     - Exploration factor override (graph indexes only).
    /// * `filter` - Only documents in this set may be returned.
    /// * `cancel` - Checked cooperatively during traversal.
    ///
    /// Returns `(distance, doc_id)` pairs sorted by ascending distance. The
    /// list may be longer than `k`; callers truncate after tie-breaking.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: Option<&RoaringBitmap>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<(f32, u32)>>;

    /// The stored vector of a document.
    fn vector(&self, doc_id: u32) -> Option<&[f32]>;

    /// Number of live vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    fn metric(&self) -> DistanceMetric;

    /// Exact scan over an explicit candidate set.
    fn exact_search(
        &self,
        query: &[f32],
        candidates: &RoaringBitmap,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<(f32, u32)>> {
        check_dimension(self.dimension(), query)?;
        let metric = self.metric();
        let mut out = Vec::with_capacity(candidates.len() as usize);
        for (step, doc_id) in candidates.iter().enumerate() {
            check_every(cancel, step, 1024)?;
            if let Some(v) = self.vector(doc_id) {
                out.push((compute_distance(query, v, metric), doc_id));
            }
        }
        out.sort_by_key(|&(d, id)| (OrderedFloat(d), id));
        Ok(out)
    }
}

pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(TesseraError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Truncate sorted results to `k`, keeping entries tied with the k-th
/// distance so callers can break ties by key.
pub fn truncate_keeping_ties(results: &mut Vec<(f32, u32)>, k: usize) {
    if k == 0 {
        results.clear();
        return;
    }
    if results.len() <= k {
        return;
    }
    let cutoff = results[k - 1].0;
    let end = results[k..]
        .iter()
        .position(|&(d, _)| d > cutoff)
        .map_or(results.len(), |p| k + p);
    results.truncate(end);
}
