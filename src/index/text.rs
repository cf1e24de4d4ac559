//! Inverted index over all text fields of one search index.
//!
//! Maps terms to postings lists (document ID, field, term frequency). Terms
//! live in an ordered map so prefix queries are a range scan. Document
//! lengths are tracked for BM25 length normalization.

use roaring::RoaringBitmap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

/// A single entry in a term's postings list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: u32,
    /// Position of the text field within the index definition.
    pub field: u16,
    pub term_frequency: u32,
}

/// Tokens of one document, grouped by field, ready to commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDelta {
    pub fields: Vec<(u16, Vec<String>)>,
    /// `(word, term)` pairs for words that stemming rewrote.
    pub surface_forms: Vec<(String, String)>,
}

impl TextDelta {
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, tokens)| tokens.is_empty())
    }
}

#[derive(Debug, Default)]
pub struct TextIndex {
    terms: BTreeMap<String, Vec<Posting>>,
    /// doc -> distinct terms it contributed, for removal.
    doc_terms: HashMap<u32, Vec<String>>,
    /// Unstemmed word -> stemmed term -> number of documents using the pair.
    surfaces: BTreeMap<String, BTreeMap<String, u32>>,
    doc_surfaces: HashMap<u32, Vec<(String, String)>>,
    doc_lengths: HashMap<u32, u32>,
    total_doc_length: u64,
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn average_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.total_doc_length as f32 / self.doc_lengths.len() as f32
    }

    /// Index a document's tokens. Any previous postings for the doc must be removed first.
    pub fn add_document(&mut self, doc_id: u32, delta: &TextDelta) {
        if delta.is_empty() {
            return;
        }

        let mut tf: BTreeMap<(&str, u16), u32> = BTreeMap::new();
        let mut doc_len = 0u32;
        for (field, tokens) in &delta.fields {
            doc_len += tokens.len() as u32;
            for token in tokens {
                *tf.entry((token.as_str(), *field)).or_insert(0) += 1;
            }
        }

        let mut distinct: HashSet<&str> = HashSet::new();
        for ((term, field), term_frequency) in tf {
            distinct.insert(term);
            self.terms.entry(term.to_string()).or_default().push(Posting {
                doc_id,
                field,
                term_frequency,
            });
        }

        self.doc_terms
            .insert(doc_id, distinct.into_iter().map(str::to_string).collect());

        let mut pairs = delta.surface_forms.clone();
        pairs.sort();
        pairs.dedup();
        for (word, term) in &pairs {
            *self
                .surfaces
                .entry(word.clone())
                .or_default()
                .entry(term.clone())
                .or_insert(0) += 1;
        }
        if !pairs.is_empty() {
            self.doc_surfaces.insert(doc_id, pairs);
        }
        self.doc_lengths.insert(doc_id, doc_len);
        self.total_doc_length += doc_len as u64;
    }

    /// Remove every posting of a document. Unknown docs are a no-op.
    pub fn remove_document(&mut self, doc_id: u32) {
        let Some(terms) = self.doc_terms.remove(&doc_id) else {
            return;
        };
        for term in terms {
            if let Some(postings) = self.terms.get_mut(&term) {
                postings.retain(|p| p.doc_id != doc_id);
                if postings.is_empty() {
                    self.terms.remove(&term);
                }
            }
        }
        for (word, term) in self.doc_surfaces.remove(&doc_id).unwrap_or_default() {
            if let Some(terms) = self.surfaces.get_mut(&word) {
                if let Some(count) = terms.get_mut(&term) {
                    *count -= 1;
                    if *count == 0 {
                        terms.remove(&term);
                    }
                }
                if terms.is_empty() {
                    self.surfaces.remove(&word);
                }
            }
        }
        if let Some(len) = self.doc_lengths.remove(&doc_id) {
            self.total_doc_length -= len as u64;
        }
    }

    /// Postings for an exact term restricted to `fields` (all fields if `None`).
    pub fn postings<'a>(
        &'a self,
        term: &str,
        fields: Option<&'a [u16]>,
    ) -> impl Iterator<Item = &'a Posting> + 'a {
        self.terms
            .get(term)
            .into_iter()
            .flatten()
            .filter(move |p| fields.map_or(true, |f| f.contains(&p.field)))
    }

    /// All indexed terms starting with `prefix`.
    pub fn terms_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.terms
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .map(|(t, _)| t.as_str())
            .take_while(move |t| t.starts_with(prefix))
    }

    /// Terms a prefix query expands to, at most `limit` of them.
    ///
    /// Besides indexed terms starting with `prefix`, this includes the stems
    /// of unstemmed words starting with it, so `programmi*` finds `program`.
    pub fn expand_prefix<'a>(&'a self, prefix: &'a str, limit: usize) -> Vec<&'a str> {
        let mut out: BTreeSet<&str> = BTreeSet::new();
        for term in self.terms_with_prefix(prefix) {
            if out.len() >= limit {
                return out.into_iter().collect();
            }
            out.insert(term);
        }
        let words = self
            .surfaces
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(word, _)| word.starts_with(prefix));
        for (_, terms) in words {
            for term in terms.keys() {
                if out.len() >= limit {
                    return out.into_iter().collect();
                }
                out.insert(term.as_str());
            }
        }
        out.into_iter().collect()
    }

    /// BM25 scores of the documents matching `term` in `fields`, scaled by field weight.
    pub fn score_term(
        &self,
        term: &str,
        fields: Option<&[u16]>,
        weights: &[f32],
    ) -> HashMap<u32, f32> {
        let mut scores = HashMap::new();
        let n = self.doc_lengths.len() as f32;
        if n == 0.0 {
            return scores;
        }

        let matching: Vec<&Posting> = self.postings(term, fields).collect();
        let df = matching
            .iter()
            .map(|p| p.doc_id)
            .collect::<HashSet<_>>()
            .len() as f32;
        if df == 0.0 {
            return scores;
        }
        // IDF: log((N - df + 0.5) / (df + 0.5) + 1)
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        let avgdl = self.average_doc_length().max(1.0);

        for p in matching {
            let dl = self.doc_lengths.get(&p.doc_id).copied().unwrap_or(0) as f32;
            let tf = p.term_frequency as f32;
            let tf_norm = (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
            let weight = weights.get(p.field as usize).copied().unwrap_or(1.0);
            *scores.entry(p.doc_id).or_insert(0.0) += idf * tf_norm * weight;
        }
        scores
    }

    /// Documents matching `term` in `fields`, as a bitmap.
    pub fn matching_docs(&self, term: &str, fields: Option<&[u16]>) -> RoaringBitmap {
        self.postings(term, fields).map(|p| p.doc_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(field: u16, text: &str) -> TextDelta {
        TextDelta {
            fields: vec![(
                field,
                text.split_whitespace().map(str::to_string).collect(),
            )],
            ..TextDelta::default()
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let mut idx = TextIndex::new();
        idx.add_document(0, &delta(0, "rust programming language"));
        idx.add_document(1, &delta(0, "python programming language"));
        assert_eq!(idx.doc_count(), 2);
        let docs = idx.matching_docs("programming", None);
        assert_eq!(docs.iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(idx.matching_docs("rust", None).len(), 1);
    }

    #[test]
    fn test_field_restriction() {
        let mut idx = TextIndex::new();
        idx.add_document(
            0,
            &TextDelta {
                fields: vec![
                    (0, vec!["laptop".into()]),
                    (1, vec!["fast".into(), "laptop".into()]),
                ],
                ..TextDelta::default()
            },
        );
        idx.add_document(1, &delta(1, "fast phone"));
        assert_eq!(idx.matching_docs("fast", Some(&[0])).len(), 0);
        assert_eq!(idx.matching_docs("fast", Some(&[1])).len(), 2);
        assert_eq!(idx.matching_docs("laptop", Some(&[0])).len(), 1);
    }

    #[test]
    fn test_remove_document_cleans_terms() {
        let mut idx = TextIndex::new();
        idx.add_document(0, &delta(0, "hello world"));
        idx.add_document(1, &delta(0, "hello rust"));
        idx.remove_document(0);
        assert_eq!(idx.doc_count(), 1);
        assert!(idx.matching_docs("world", None).is_empty());
        assert_eq!(idx.matching_docs("hello", None).iter().collect::<Vec<_>>(), vec![1]);
        idx.remove_document(99);
        assert_eq!(idx.doc_count(), 1);
    }

    #[test]
    fn test_prefix_terms() {
        let mut idx = TextIndex::new();
        idx.add_document(0, &delta(0, "headphones headset heater"));
        idx.add_document(1, &delta(0, "keyboard"));
        let terms: Vec<&str> = idx.terms_with_prefix("head").collect();
        assert_eq!(terms, vec!["headphones", "headset"]);
    }

    #[test]
    fn test_prefix_reaches_stems_through_surface_words() {
        let mut idx = TextIndex::new();
        let stemmed = TextDelta {
            fields: vec![(0, vec!["program".into(), "guid".into()])],
            surface_forms: vec![
                ("programming".into(), "program".into()),
                ("guides".into(), "guid".into()),
            ],
        };
        idx.add_document(0, &stemmed);
        idx.add_document(1, &delta(0, "programmer"));

        assert_eq!(idx.expand_prefix("programmi", 10), vec!["program"]);
        assert_eq!(idx.expand_prefix("program", 10), vec!["program", "programmer"]);
        assert_eq!(idx.expand_prefix("program", 1).len(), 1);
        assert_eq!(idx.expand_prefix("guide", 10), vec!["guid"]);

        idx.remove_document(0);
        assert!(idx.expand_prefix("programmi", 10).is_empty());
        assert!(idx.expand_prefix("guide", 10).is_empty());
    }

    #[test]
    fn test_higher_tf_scores_higher() {
        let mut idx = TextIndex::new();
        idx.add_document(0, &delta(0, "rust rust rust"));
        idx.add_document(1, &delta(0, "rust programming"));
        idx.add_document(2, &delta(0, "java programming"));
        let scores = idx.score_term("rust", None, &[1.0]);
        assert!(scores[&0] > scores[&1]);
        assert!(scores.values().all(|&s| s > 0.0));
        assert!(!scores.contains_key(&2));
    }

    #[test]
    fn test_field_weight_scales_score() {
        let mut idx = TextIndex::new();
        idx.add_document(0, &delta(0, "lamp"));
        idx.add_document(1, &delta(1, "lamp"));
        let scores = idx.score_term("lamp", None, &[1.0, 3.0]);
        assert!((scores[&1] - 3.0 * scores[&0]).abs() < 1e-4);
    }
}
