//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! Each document owns at most one live graph node. Replacing a document's
//! vector tombstones the old node (it stays in the graph for navigation) and
//! inserts a new one. Once tombstones outnumber live nodes the graph is
//! rebuilt from the live vectors.

mod insert;
mod search;
pub mod visited;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;
use std::collections::HashMap;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::index::traits::{check_dimension, VectorIndex};
use crate::types::DistanceMetric;

/// Tombstones tolerated before a rebuild is considered.
pub const MIN_TOMBSTONES_FOR_REBUILD: usize = 64;

/// Graph tuning parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HnswConfig {
    /// Links per node on layers above 0.
    pub m: usize,
    /// Links per node on layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Default candidate list size during search.
    pub ef_runtime: usize,
    pub max_layers: usize,
    pub metric: DistanceMetric,
    /// Seed for level assignment; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl HnswConfig {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 200,
            ef_runtime: 10,
            max_layers: 16,
            metric,
            seed: None,
        }
    }

    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self.m_max0 = m * 2;
        self
    }

    /// `mL = 1 / ln(M)`, the normalization factor of the level distribution.
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.m.max(2) as f64).ln()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub doc_id: u32,
    pub vector: Vec<f32>,
    /// `neighbors[layer]` for every layer the node participates in.
    pub neighbors: Vec<Vec<u32>>,
    pub deleted: bool,
}

impl Node {
    pub fn level(&self) -> usize {
        self.neighbors.len() - 1
    }
}

#[derive(Debug)]
pub struct HnswIndex {
    pub(crate) config: HnswConfig,
    pub(crate) dimension: usize,
    pub(crate) nodes: Vec<Node>,
    /// doc_id -> live node id
    pub(crate) doc_nodes: HashMap<u32, u32>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) max_layer: usize,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            dimension,
            nodes: Vec::new(),
            doc_nodes: HashMap::new(),
            entry_point: None,
            max_layer: 0,
            rng,
        }
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Total graph nodes, tombstones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn tombstones(&self) -> usize {
        self.nodes.len() - self.doc_nodes.len()
    }

    /// Draw a layer for a new node: `floor(-ln(U) * mL)`, capped at `max_layers - 1`.
    pub(crate) fn random_level(&mut self) -> usize {
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        let level = (-u.ln() * self.config.level_multiplier()).floor() as usize;
        level.min(self.config.max_layers.saturating_sub(1))
    }

    pub(crate) fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    fn clear_graph(&mut self) {
        self.nodes.clear();
        self.doc_nodes.clear();
        self.entry_point = None;
        self.max_layer = 0;
    }

    /// Rebuild the graph from live vectors, dropping every tombstone.
    pub fn rebuild(&mut self) {
        let mut live: Vec<(u32, Vec<f32>)> = self
            .doc_nodes
            .iter()
            .map(|(&doc, &node)| (doc, std::mem::take(&mut self.nodes[node as usize].vector)))
            .collect();
        live.sort_by_key(|(doc, _)| *doc);

        let before = self.nodes.len();
        self.clear_graph();
        for (doc_id, vector) in live {
            self.insert_node(doc_id, vector);
        }
        debug!(before, after = self.nodes.len(), "rebuilt hnsw graph");
    }

    fn maybe_rebuild(&mut self) {
        // A graph made only of tombstones cannot route to new nodes.
        if self.doc_nodes.is_empty() {
            self.clear_graph();
            return;
        }
        let tombstones = self.tombstones();
        if tombstones >= MIN_TOMBSTONES_FOR_REBUILD && tombstones > self.doc_nodes.len() {
            self.rebuild();
        }
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&mut self, doc_id: u32, vector: &[f32]) -> Result<()> {
        check_dimension(self.dimension, vector)?;

        if let Some(&node) = self.doc_nodes.get(&doc_id) {
            if self.nodes[node as usize].vector == vector {
                return Ok(());
            }
            self.remove(doc_id);
        }

        self.insert_node(doc_id, vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, doc_id: u32) -> bool {
        let Some(node) = self.doc_nodes.remove(&doc_id) else {
            return false;
        };
        self.nodes[node as usize].deleted = true;
        self.maybe_rebuild();
        true
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        filter: Option<&RoaringBitmap>,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<(f32, u32)>> {
        check_dimension(self.dimension, query)?;
        let ef = ef.unwrap_or(self.config.ef_runtime);
        self.knn_search(query, k, ef, filter, cancel)
    }

    fn vector(&self, doc_id: u32) -> Option<&[f32]> {
        self.doc_nodes
            .get(&doc_id)
            .map(|&node| self.nodes[node as usize].vector.as_slice())
    }

    fn len(&self) -> usize {
        self.doc_nodes.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.config.metric
    }
}
