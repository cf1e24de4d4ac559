//! Single-layer beam search and multi-layer KNN.
//!
//! Results are restricted by an `include` predicate; excluded nodes (tombstones,
//! documents outside the filter) are still traversed so the graph stays
//! navigable around them.

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::visited::VisitedSet;
use super::HnswIndex;
use crate::cancel::{check_every, CancelToken};
use crate::error::Result;
use crate::index::distance::compute_distance;

/// Candidate pops between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

type Entry = (OrderedFloat<f32>, u32);

impl HnswIndex {
    #[inline]
    pub(crate) fn distance_to(&self, query: &[f32], node: u32) -> f32 {
        compute_distance(query, &self.nodes[node as usize].vector, self.config.metric)
    }

    /// Beam search on one layer. Returns up to `ef` `(distance, node)` pairs
    /// accepted by `include`, closest first.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search_layer<F: Fn(u32) -> bool>(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        include: &F,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<(f32, u32)>> {
        visited.clear();
        let capacity = ef.min(self.nodes.len());
        let mut candidates: BinaryHeap<Reverse<Entry>> = BinaryHeap::with_capacity(capacity * 2);
        let mut results: BinaryHeap<Entry> = BinaryHeap::with_capacity(capacity + 1);
        let mut worst = f32::MAX;

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let dist = self.distance_to(query, ep);
            candidates.push(Reverse((OrderedFloat(dist), ep)));
            if include(ep) {
                results.push((OrderedFloat(dist), ep));
                if results.len() > ef {
                    results.pop();
                }
                if results.len() >= ef {
                    worst = results.peek().map_or(f32::MAX, |r| r.0 .0);
                }
            }
        }

        let mut pops = 0usize;
        while let Some(Reverse((OrderedFloat(c_dist), node))) = candidates.pop() {
            check_every(cancel, pops, CANCEL_CHECK_INTERVAL)?;
            pops += 1;

            if results.len() >= ef && c_dist > worst {
                break;
            }

            let Some(neighbors) = self.nodes[node as usize].neighbors.get(layer) else {
                continue;
            };
            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = self.distance_to(query, neighbor);
                if results.len() >= ef && dist >= worst {
                    continue;
                }
                candidates.push(Reverse((OrderedFloat(dist), neighbor)));
                if include(neighbor) {
                    results.push((OrderedFloat(dist), neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                    if results.len() >= ef {
                        worst = results.peek().map_or(f32::MAX, |r| r.0 .0);
                    }
                }
            }
        }

        Ok(results
            .into_sorted_vec()
            .into_iter()
            .map(|(d, id)| (d.0, id))
            .collect())
    }

    /// Greedy descent from the entry point down to `target_layer + 1`.
    /// Tombstones are valid waypoints here.
    pub(crate) fn descend(
        &self,
        query: &[f32],
        target_layer: usize,
        visited: &mut VisitedSet,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<u32>> {
        let Some(mut current) = self.entry_point else {
            return Ok(None);
        };
        let anything = |_: u32| true;
        for layer in (target_layer + 1..=self.max_layer).rev() {
            let nearest = self.search_layer(
                query,
                std::slice::from_ref(&current),
                1,
                layer,
                visited,
                &anything,
                cancel,
            )?;
            if let Some(&(_, node)) = nearest.first() {
                current = node;
            }
        }
        Ok(Some(current))
    }

    /// KNN over live nodes, optionally restricted to documents in `filter`.
    ///
    /// When the filter starves the beam, `ef` is doubled (up to 4x or the
    /// graph size) until `k` results are found. Returns `(distance, doc_id)`
    /// sorted by distance then doc id; may hold more than `k` entries.
    pub(crate) fn knn_search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&RoaringBitmap>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<(f32, u32)>> {
        if k == 0 || self.doc_nodes.is_empty() {
            return Ok(Vec::new());
        }
        let mut visited = VisitedSet::new(self.nodes.len());
        let Some(entry) = self.descend(query, 0, &mut visited, cancel)? else {
            return Ok(Vec::new());
        };

        let include = |node: u32| {
            let n = &self.nodes[node as usize];
            !n.deleted && filter.map_or(true, |f| f.contains(n.doc_id))
        };

        // Neither k nor ef can usefully exceed the graph size.
        let graph_size = self.nodes.len();
        let k = k.min(graph_size);
        let base_ef = ef.max(k).clamp(1, graph_size);
        let max_ef = base_ef.saturating_mul(4).min(graph_size);
        let mut ef = base_ef;
        let mut found = loop {
            let found = self.search_layer(
                query,
                std::slice::from_ref(&entry),
                ef,
                0,
                &mut visited,
                &include,
                cancel,
            )?;
            if found.len() >= k || ef >= max_ef {
                break found;
            }
            ef = ef.saturating_mul(2).min(max_ef);
        };

        for entry in found.iter_mut() {
            entry.1 = self.nodes[entry.1 as usize].doc_id;
        }
        found.sort_by_key(|&(d, doc)| (OrderedFloat(d), doc));
        Ok(found)
    }
}
