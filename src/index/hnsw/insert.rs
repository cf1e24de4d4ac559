//! Graph construction: layered insertion with heuristic neighbor selection.

use std::collections::HashSet;

use super::visited::VisitedSet;
use super::{HnswIndex, Node};
use crate::index::distance::compute_distance;

impl HnswIndex {
    /// Append a node for `doc_id` and wire it into every layer up to its level.
    /// The caller has already checked the dimension and retired any previous
    /// node of the document.
    pub(crate) fn insert_node(&mut self, doc_id: u32, vector: Vec<f32>) {
        let level = self.random_level();
        let node_id = self.nodes.len() as u32;

        let Some(start) = self.entry_point else {
            self.nodes.push(Node {
                doc_id,
                vector,
                neighbors: vec![Vec::new(); level + 1],
                deleted: false,
            });
            self.doc_nodes.insert(doc_id, node_id);
            self.entry_point = Some(node_id);
            self.max_layer = level;
            return;
        };

        let mut visited = VisitedSet::new(self.nodes.len() + 1);
        let live = |node: u32| !self.nodes[node as usize].deleted;

        // Construction never cancels, so the searches below cannot fail.
        let entry = self
            .descend(&vector, level, &mut visited, None)
            .ok()
            .flatten()
            .unwrap_or(start);

        let top = level.min(self.max_layer);
        let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut layer_eps = vec![entry];
        for layer in (0..=top).rev() {
            let candidates = self
                .search_layer(
                    &vector,
                    &layer_eps,
                    self.config.ef_construction,
                    layer,
                    &mut visited,
                    &live,
                    None,
                )
                .unwrap_or_default();
            neighbors[layer] = self.select_neighbors(&candidates, self.max_links(layer));

            if !candidates.is_empty() {
                layer_eps = candidates.iter().map(|&(_, id)| id).collect();
            }
        }

        self.nodes.push(Node {
            doc_id,
            vector,
            neighbors,
            deleted: false,
        });
        self.doc_nodes.insert(doc_id, node_id);

        for layer in 0..=top {
            let max_links = self.max_links(layer);
            let linked = self.nodes[node_id as usize].neighbors[layer].clone();
            for neighbor in linked {
                let nid = neighbor as usize;
                self.nodes[nid].neighbors[layer].push(node_id);
                if self.nodes[nid].neighbors[layer].len() > max_links {
                    let base = &self.nodes[nid].vector;
                    let scored: Vec<(f32, u32)> = self.nodes[nid].neighbors[layer]
                        .iter()
                        .map(|&c| {
                            let d = compute_distance(
                                base,
                                &self.nodes[c as usize].vector,
                                self.config.metric,
                            );
                            (d, c)
                        })
                        .collect();
                    let pruned = self.select_neighbors(&scored, max_links);
                    self.nodes[nid].neighbors[layer] = pruned;
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(node_id);
        }
    }

    /// Keep a candidate only if it is closer to the base than to every
    /// neighbor already kept, then top up with the closest leftovers.
    pub(crate) fn select_neighbors(&self, candidates: &[(f32, u32)], m: usize) -> Vec<u32> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut selected: Vec<u32> = Vec::with_capacity(m);
        for &(dist_to_base, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            let candidate = &self.nodes[cid as usize].vector;
            let diverse = selected.iter().all(|&sid| {
                let to_selected =
                    compute_distance(candidate, &self.nodes[sid as usize].vector, self.config.metric);
                dist_to_base <= to_selected
            });
            if diverse {
                selected.push(cid);
            }
        }

        if selected.len() < m {
            let taken: HashSet<u32> = selected.iter().copied().collect();
            for &(_, cid) in &sorted {
                if selected.len() >= m {
                    break;
                }
                if !taken.contains(&cid) {
                    selected.push(cid);
                }
            }
        }
        selected
    }
}
