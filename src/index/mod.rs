//! Per-index structures and the write path into them.
//!
//! A [`SearchIndex`] owns one inverted text index shared by all text fields
//! plus one structure per tag, numeric, geo and vector field. Document keys
//! are mapped to dense `u32` ids so candidate sets can be roaring bitmaps.
//!
//! Writes happen in two phases. [`SearchIndex::stage`] validates and
//! converts a document's fields without touching any shared state, so a
//! rejected document leaves every index untouched. [`IndexData::commit`]
//! then applies the staged document and cannot fail.

pub mod distance;
pub mod flat;
pub mod geo;
pub mod hnsw;
pub mod numeric;
pub mod tag;
pub mod text;
pub mod tokenizer;
pub mod traits;

use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::error;

use crate::config::EngineConfig;
use crate::error::{Result, TesseraError};
use crate::schema::{FieldKind, IndexDefinition, IndexInfo, VectorAlgorithm, VectorFieldOptions};
use crate::types::{FieldValue, Fields, GeoPoint};

pub use flat::FlatIndex;
pub use geo::GeoIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use numeric::NumericIndex;
pub use tag::{normalize_tag, TagIndex};
pub use text::{TextDelta, TextIndex};
pub use tokenizer::Tokenizer;
pub use traits::VectorIndex;

/// Bidirectional map between document keys and dense ids.
#[derive(Debug, Default)]
pub struct DocTable {
    ids: HashMap<String, u32>,
    keys: Vec<Option<String>>,
    free: Vec<u32>,
    live: RoaringBitmap,
}

impl DocTable {
    pub fn id_of(&self, key: &str) -> Option<u32> {
        self.ids.get(key).copied()
    }

    pub fn key_of(&self, id: u32) -> Option<&str> {
        self.keys.get(id as usize).and_then(|k| k.as_deref())
    }

    /// Id of `key`, allocating one if the key is new.
    pub fn assign(&mut self, key: &str) -> u32 {
        if let Some(id) = self.ids.get(key) {
            return *id;
        }
        let id = match self.free.pop() {
            Some(id) => {
                self.keys[id as usize] = Some(key.to_string());
                id
            }
            None => {
                self.keys.push(Some(key.to_string()));
                (self.keys.len() - 1) as u32
            }
        };
        self.ids.insert(key.to_string(), id);
        self.live.insert(id);
        id
    }

    pub fn release(&mut self, key: &str) -> Option<u32> {
        let id = self.ids.remove(key)?;
        self.keys[id as usize] = None;
        self.free.push(id);
        self.live.remove(id);
        Some(id)
    }

    /// Every indexed document.
    pub fn all(&self) -> &RoaringBitmap {
        &self.live
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Index structure behind one non-text field.
#[derive(Debug)]
pub enum FieldStructure {
    /// Text fields share [`IndexData::text`].
    Text,
    Tag(TagIndex),
    Numeric(NumericIndex),
    Geo(GeoIndex),
    Vector(Box<dyn VectorIndex>),
}

/// A field value converted to what its index stores.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedValue {
    Tags(Vec<String>),
    Number(f64),
    Geo(GeoPoint),
    Vector(Vec<f32>),
}

/// A validated document, ready to commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedDocument {
    pub text: TextDelta,
    /// `(field position, value)` for every non-text field present.
    pub values: Vec<(usize, StagedValue)>,
}

/// Mutable contents of a search index. Guarded by the index's lock.
#[derive(Debug)]
pub struct IndexData {
    pub docs: DocTable,
    pub text: TextIndex,
    /// Parallel to the definition's fields.
    pub fields: Vec<FieldStructure>,
}

impl IndexData {
    fn new(definition: &IndexDefinition, engine: &EngineConfig) -> Self {
        let fields = definition
            .fields
            .iter()
            .map(|spec| match &spec.kind {
                FieldKind::Text { .. } => FieldStructure::Text,
                FieldKind::Tag { case_sensitive, .. } => {
                    FieldStructure::Tag(TagIndex::new(*case_sensitive))
                }
                FieldKind::Numeric => FieldStructure::Numeric(NumericIndex::new()),
                FieldKind::Geo => FieldStructure::Geo(GeoIndex::new()),
                FieldKind::Vector(opts) => FieldStructure::Vector(build_vector_index(opts, engine)),
            })
            .collect();
        Self {
            docs: DocTable::default(),
            text: TextIndex::new(),
            fields,
        }
    }

    /// Apply a staged document, replacing whatever `key` indexed before.
    pub fn commit(&mut self, key: &str, staged: &StagedDocument) {
        let id = match self.docs.id_of(key) {
            Some(id) => {
                self.clear_structures(id, staged);
                id
            }
            None => self.docs.assign(key),
        };

        self.text.add_document(id, &staged.text);
        for (pos, value) in &staged.values {
            match (&mut self.fields[*pos], value) {
                (FieldStructure::Tag(idx), StagedValue::Tags(tags)) => idx.insert(id, tags),
                (FieldStructure::Numeric(idx), StagedValue::Number(n)) => idx.insert(id, *n),
                (FieldStructure::Geo(idx), StagedValue::Geo(p)) => idx.insert(id, *p),
                (FieldStructure::Vector(idx), StagedValue::Vector(v)) => {
                    if let Err(e) = idx.insert(id, v) {
                        error!(key, field = pos, error = %e, "vector insert failed after staging");
                    }
                }
                (_, value) => {
                    error!(key, field = pos, ?value, "staged value does not match field structure");
                }
            }
        }
    }

    /// Drop `key` from every structure. Returns `false` if it was not indexed.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(id) = self.docs.release(key) else {
            return false;
        };
        self.text.remove_document(id);
        for field in &mut self.fields {
            match field {
                FieldStructure::Text => {}
                FieldStructure::Tag(idx) => idx.remove(id),
                FieldStructure::Numeric(idx) => idx.remove(id),
                FieldStructure::Geo(idx) => idx.remove(id),
                FieldStructure::Vector(idx) => {
                    idx.remove(id);
                }
            }
        }
        true
    }

    /// Remove the old entries of `id` ahead of a replacement. A vector left
    /// unchanged stays in place so graph indexes are not churned.
    fn clear_structures(&mut self, id: u32, staged: &StagedDocument) {
        self.text.remove_document(id);
        for (pos, field) in self.fields.iter_mut().enumerate() {
            match field {
                FieldStructure::Text => {}
                FieldStructure::Tag(idx) => idx.remove(id),
                FieldStructure::Numeric(idx) => idx.remove(id),
                FieldStructure::Geo(idx) => idx.remove(id),
                FieldStructure::Vector(idx) => {
                    let kept = staged.values.iter().any(|(p, v)| {
                        *p == pos && matches!(v, StagedValue::Vector(new) if idx.vector(id) == Some(new.as_slice()))
                    });
                    if !kept {
                        idx.remove(id);
                    }
                }
            }
        }
    }

    /// Total vectors across all vector fields.
    pub fn vector_count(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f {
                FieldStructure::Vector(idx) => idx.len(),
                _ => 0,
            })
            .sum()
    }
}

fn build_vector_index(opts: &VectorFieldOptions, engine: &EngineConfig) -> Box<dyn VectorIndex> {
    match opts.algorithm {
        VectorAlgorithm::Flat => Box::new(FlatIndex::new(opts.dim, opts.distance_metric)),
        VectorAlgorithm::Hnsw => {
            let m = opts.m.unwrap_or(engine.hnsw_m);
            let config = HnswConfig {
                m,
                m_max0: m * 2,
                ef_construction: opts.ef_construction.unwrap_or(engine.hnsw_ef_construction),
                ef_runtime: opts.ef_runtime.unwrap_or(engine.hnsw_ef_runtime),
                max_layers: engine.hnsw_max_layers,
                metric: opts.distance_metric,
                seed: engine.hnsw_seed,
            };
            Box::new(HnswIndex::new(opts.dim, config))
        }
    }
}

/// A registered index: its immutable definition plus lock-guarded contents.
#[derive(Debug)]
pub struct SearchIndex {
    definition: IndexDefinition,
    /// Per-field BM25 weight (1.0 for non-text fields).
    weights: Vec<f32>,
    data: RwLock<IndexData>,
    created_at: DateTime<Utc>,
    indexing_failures: AtomicUsize,
}

impl SearchIndex {
    pub fn new(definition: IndexDefinition, engine: &EngineConfig) -> Self {
        let weights = definition
            .fields
            .iter()
            .map(|f| match f.kind {
                FieldKind::Text { weight, .. } => weight,
                _ => 1.0,
            })
            .collect();
        let data = RwLock::new(IndexData::new(&definition, engine));
        Self {
            definition,
            weights,
            data,
            created_at: Utc::now(),
            indexing_failures: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn read(&self) -> RwLockReadGuard<'_, IndexData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, IndexData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_failure(&self) {
        self.indexing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn indexing_failures(&self) -> usize {
        self.indexing_failures.load(Ordering::Relaxed)
    }

    /// Validate and convert the indexed fields of a document.
    ///
    /// Fields the definition does not mention are ignored, as are indexed
    /// fields the document lacks.
    ///
    /// # Errors
    /// `DimensionMismatch` for a vector of the wrong length and
    /// `InvalidFieldValue` for any value that cannot be coerced to its field type.
    pub fn stage(&self, tokenizer: &Tokenizer, fields: &Fields) -> Result<StagedDocument> {
        let mut staged = StagedDocument::default();
        for (pos, spec) in self.definition.fields.iter().enumerate() {
            let Some(value) = fields.get(&spec.path) else {
                continue;
            };
            let name = spec.name();
            match &spec.kind {
                FieldKind::Text { nostem, .. } => {
                    let text = match value {
                        FieldValue::Text(s) => s.clone(),
                        FieldValue::Tags(tags) => tags.join(" "),
                        FieldValue::Number(n) => n.to_string(),
                        other => return Err(mismatch(name, "text", other)),
                    };
                    let mut tokens = Vec::new();
                    for (word, term) in tokenizer.tokens(&text, !nostem) {
                        if word != term {
                            staged.text.surface_forms.push((word, term.clone()));
                        }
                        tokens.push(term);
                    }
                    staged.text.fields.push((pos as u16, tokens));
                }
                FieldKind::Tag {
                    separator,
                    case_sensitive,
                } => {
                    let raw: Vec<&str> = match value {
                        FieldValue::Text(s) => s.split(*separator).collect(),
                        FieldValue::Tags(tags) => tags.iter().map(String::as_str).collect(),
                        other => return Err(mismatch(name, "tag", other)),
                    };
                    let mut tags: Vec<String> = raw
                        .into_iter()
                        .map(|t| normalize_tag(t, *case_sensitive))
                        .filter(|t| !t.is_empty())
                        .collect();
                    tags.sort();
                    tags.dedup();
                    staged.values.push((pos, StagedValue::Tags(tags)));
                }
                FieldKind::Numeric => {
                    let n = match value {
                        FieldValue::Number(n) => *n,
                        FieldValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                            TesseraError::invalid_value(name, format!("'{s}' is not a number"))
                        })?,
                        other => return Err(mismatch(name, "numeric", other)),
                    };
                    if n.is_nan() {
                        return Err(TesseraError::invalid_value(name, "NaN is not indexable"));
                    }
                    staged.values.push((pos, StagedValue::Number(n)));
                }
                FieldKind::Geo => {
                    let point = match value {
                        FieldValue::Geo(p) => *p,
                        FieldValue::Text(s) => parse_geo(s)
                            .ok_or_else(|| TesseraError::invalid_value(name, format!("'{s}' is not 'lon,lat'")))?,
                        other => return Err(mismatch(name, "geo", other)),
                    };
                    geo::validate_point(&point).map_err(|reason| TesseraError::invalid_value(name, reason))?;
                    staged.values.push((pos, StagedValue::Geo(point)));
                }
                FieldKind::Vector(opts) => {
                    let FieldValue::Vector(v) = value else {
                        return Err(mismatch(name, "vector", value));
                    };
                    traits::check_dimension(opts.dim, v)?;
                    if v.iter().any(|x| !x.is_finite()) {
                        return Err(TesseraError::invalid_value(name, "vector holds a non-finite component"));
                    }
                    staged.values.push((pos, StagedValue::Vector(v.clone())));
                }
            }
        }
        Ok(staged)
    }

    pub fn info(&self) -> IndexInfo {
        let data = self.read();
        IndexInfo {
            definition: self.definition.clone(),
            num_docs: data.docs.len(),
            indexing_failures: self.indexing_failures(),
            num_terms: data.text.term_count(),
            vector_nodes: data.vector_count(),
            created_at: self.created_at,
        }
    }
}

fn mismatch(field: &str, expected: &str, got: &FieldValue) -> TesseraError {
    TesseraError::invalid_value(field, format!("expected {expected} value, got {}", got.kind()))
}

/// Parse `"lon,lat"` (a space also separates).
pub fn parse_geo(s: &str) -> Option<GeoPoint> {
    let mut parts = s.split(|c: char| c == ',' || c.is_whitespace()).filter(|p| !p.is_empty());
    let lon = parts.next()?.parse().ok()?;
    let lat = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(GeoPoint::new(lon, lat))
}
