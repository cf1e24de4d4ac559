//! Brute-force vector index. Exact results, linear scan.
//!
//! Results tied with the k-th distance are all returned.

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use std::collections::BTreeMap;

use crate::cancel::{check_every, CancelToken};
use crate::error::Result;
use crate::index::distance::compute_distance;
use crate::index::traits::{check_dimension, truncate_keeping_ties, VectorIndex};
use crate::types::DistanceMetric;

#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    metric: DistanceMetric,
    vectors: BTreeMap<u32, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            vectors: BTreeMap::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, doc_id: u32, vector: &[f32]) -> Result<()> {
        check_dimension(self.dimension, vector)?;
        self.vectors.insert(doc_id, vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, doc_id: u32) -> bool {
        self.vectors.remove(&doc_id).is_some()
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        _ef: Option<usize>,
        filter: Option<&RoaringBitmap>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<(f32, u32)>> {
        check_dimension(self.dimension, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(candidates) = filter {
            let mut out = self.exact_search(query, candidates, cancel)?;
            truncate_keeping_ties(&mut out, k);
            return Ok(out);
        }

        let mut out = Vec::with_capacity(self.vectors.len());
        for (step, (&doc_id, v)) in self.vectors.iter().enumerate() {
            check_every(cancel, step, 1024)?;
            out.push((compute_distance(query, v, self.metric), doc_id));
        }
        out.sort_by_key(|&(d, id)| (OrderedFloat(d), id));
        truncate_keeping_ties(&mut out, k);
        Ok(out)
    }

    fn vector(&self, doc_id: u32) -> Option<&[f32]> {
        self.vectors.get(&doc_id).map(Vec::as_slice)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
