//! Query execution against one index.
//!
//! Filters are evaluated to a candidate bitmap first. A KNN clause then
//! ranks only those candidates: small candidate sets are scored exactly,
//! larger ones go through a filtered graph search, and a bare `*` filter
//! searches the whole vector index.

use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::parser::{FieldRef, KnnClause, ParamOr, ParsedQuery, QueryNode, TermQuery};
use super::{QueryParam, SearchOptions};
use crate::cancel::check_every;
use crate::error::{Result, TesseraError};
use crate::index::traits::check_dimension;
use crate::index::{FieldStructure, IndexData, SearchIndex, Tokenizer};
use crate::schema::{FieldKind, FieldSpec};
use crate::store::DocumentStore;
use crate::types::{FieldValue, Fields, SearchHit, SearchResults};

/// Upper bound on terms a prefix query expands to.
const MAX_PREFIX_EXPANSIONS: usize = 200;

/// Documents matched by a filter, with text scores when terms were involved.
#[derive(Debug, Default)]
struct Matches {
    docs: RoaringBitmap,
    scores: HashMap<u32, f32>,
    scored: bool,
}

impl Matches {
    fn unscored(docs: RoaringBitmap) -> Self {
        Self {
            docs,
            ..Default::default()
        }
    }

    fn scored(scores: HashMap<u32, f32>) -> Self {
        Self {
            docs: scores.keys().copied().collect(),
            scores,
            scored: true,
        }
    }

    fn merge_scores(&mut self, other: HashMap<u32, f32>) {
        for (doc, s) in other {
            *self.scores.entry(doc).or_insert(0.0) += s;
        }
    }

    fn and(mut self, other: Matches) -> Self {
        self.docs &= &other.docs;
        self.scored |= other.scored;
        self.merge_scores(other.scores);
        let docs = &self.docs;
        self.scores.retain(|doc, _| docs.contains(*doc));
        self
    }

    fn or(mut self, other: Matches) -> Self {
        self.docs |= &other.docs;
        self.scored |= other.scored;
        self.merge_scores(other.scores);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Number(f64),
    Text(String),
}

fn cmp_sort_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(y),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
    }
}

struct Candidate<'a> {
    doc_id: u32,
    key: &'a str,
    score: Option<f32>,
}

/// Executes parsed queries while the caller holds the index read lock.
pub struct Executor<'a> {
    index: &'a SearchIndex,
    data: &'a IndexData,
    store: &'a DocumentStore,
    tokenizer: &'a Tokenizer,
    brute_force_threshold: usize,
    options: &'a SearchOptions,
}

impl<'a> Executor<'a> {
    pub fn new(
        index: &'a SearchIndex,
        data: &'a IndexData,
        store: &'a DocumentStore,
        tokenizer: &'a Tokenizer,
        brute_force_threshold: usize,
        options: &'a SearchOptions,
    ) -> Self {
        Self {
            index,
            data,
            store,
            tokenizer,
            brute_force_threshold,
            options,
        }
    }

    pub fn execute(&self, query: &ParsedQuery) -> Result<SearchResults> {
        let mut candidates = match &query.knn {
            Some(knn) => self.knn_candidates(&query.filter, knn)?,
            None => self.filter_candidates(&query.filter)?,
        };

        if let Some(sort) = &self.options.sort_by {
            let knn_alias = query.knn.as_ref().map(score_alias);
            if knn_alias.as_deref() == Some(sort.field.as_str()) {
                self.sort_by_score(&mut candidates, sort.ascending);
            } else {
                self.sort_by_field(&mut candidates, &sort.field, sort.ascending)?;
            }
        }

        let total = candidates.len();
        let alias = query.knn.as_ref().map(score_alias);
        let hits = candidates
            .into_iter()
            .skip(self.options.offset)
            .take(self.options.limit)
            .filter_map(|c| self.hit(c, alias.as_deref()))
            .collect();
        Ok(SearchResults { total, hits })
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.options.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    /// Matches of a plain filter query: by score when terms were scored, else by key.
    fn filter_candidates(&self, filter: &QueryNode) -> Result<Vec<Candidate<'a>>> {
        let Some(matches) = self.eval(filter)? else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Candidate<'a>> = matches
            .docs
            .iter()
            .filter_map(|doc_id| {
                let key = self.data.docs.key_of(doc_id)?;
                let score = matches
                    .scored
                    .then(|| matches.scores.get(&doc_id).copied().unwrap_or(0.0));
                Some(Candidate { doc_id, key, score })
            })
            .collect();
        if matches.scored {
            out.sort_by(|a, b| {
                let (sa, sb) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
                sb.total_cmp(&sa).then_with(|| a.key.cmp(b.key))
            });
        } else {
            out.sort_by(|a, b| a.key.cmp(b.key));
        }
        Ok(out)
    }

    /// The K nearest documents among those passing the filter, by distance then key.
    fn knn_candidates(&self, filter: &QueryNode, knn: &KnnClause) -> Result<Vec<Candidate<'a>>> {
        let (pos, _) = self.resolve(&knn.field, "vector", |k| matches!(k, FieldKind::Vector(_)))?;
        let FieldStructure::Vector(vectors) = &self.data.fields[pos] else {
            return Err(TesseraError::Internal(format!(
                "field '{}' has no vector structure",
                knn.field.name
            )));
        };

        let query = match self.options.params.get(&knn.vector_param) {
            Some(QueryParam::Vector(v)) => v.as_slice(),
            Some(_) => {
                return Err(TesseraError::malformed(
                    knn.position,
                    format!("parameter ${} is not a vector", knn.vector_param),
                ))
            }
            None => {
                return Err(TesseraError::malformed(
                    knn.position,
                    format!("missing parameter ${}", knn.vector_param),
                ))
            }
        };
        check_dimension(vectors.dimension(), query)?;
        let k = self.resolve_count(&knn.k, knn.position)?;
        let ef = knn
            .ef_runtime
            .as_ref()
            .map(|e| self.resolve_count(e, knn.position))
            .transpose()?;
        let cancel = self.options.cancel.as_ref();

        let neighbors = if matches!(filter, QueryNode::All) {
            vectors.search(query, k, ef, None, cancel)?
        } else {
            let Some(matches) = self.eval(filter)? else {
                return Ok(Vec::new());
            };
            let allowed = matches.docs;
            if allowed.len() as usize <= self.brute_force_threshold {
                debug!(candidates = allowed.len(), "exact knn over filtered candidates");
                vectors.exact_search(query, &allowed, cancel)?
            } else {
                debug!(candidates = allowed.len(), "filtered graph knn");
                vectors.search(query, k, ef, Some(&allowed), cancel)?
            }
        };

        let mut out: Vec<Candidate<'a>> = neighbors
            .into_iter()
            .filter_map(|(distance, doc_id)| {
                let key = self.data.docs.key_of(doc_id)?;
                Some(Candidate {
                    doc_id,
                    key,
                    score: Some(distance),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            OrderedFloat(a.score.unwrap_or(f32::MAX))
                .cmp(&OrderedFloat(b.score.unwrap_or(f32::MAX)))
                .then_with(|| a.key.cmp(b.key))
        });
        out.truncate(k);
        Ok(out)
    }

    fn resolve_count(&self, value: &ParamOr<usize>, position: usize) -> Result<usize> {
        let name = match value {
            ParamOr::Value(n) => return Ok(*n),
            ParamOr::Param(name) => name,
        };
        match self.options.params.get(name) {
            Some(QueryParam::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
            Some(QueryParam::Text(s)) => s.trim().parse().map_err(|_| {
                TesseraError::malformed(position, format!("parameter ${name} is not a count"))
            }),
            Some(_) => Err(TesseraError::malformed(
                position,
                format!("parameter ${name} is not a count"),
            )),
            None => Err(TesseraError::malformed(
                position,
                format!("missing parameter ${name}"),
            )),
        }
    }

    /// Look up a field by query name and check its type.
    fn resolve<F>(&self, field: &FieldRef, expected: &str, accepts: F) -> Result<(usize, &'a FieldSpec)>
    where
        F: Fn(&FieldKind) -> bool,
    {
        let definition = self.index.definition();
        let Some(pos) = definition.fields.iter().position(|f| f.name() == field.name) else {
            return Err(TesseraError::malformed(
                field.position,
                format!("unknown field '{}'", field.name),
            ));
        };
        let spec = &definition.fields[pos];
        if !accepts(&spec.kind) {
            return Err(TesseraError::malformed(
                field.position,
                format!(
                    "field '{}' is a {} field, not {expected}",
                    field.name,
                    spec.kind.type_name()
                ),
            ));
        }
        Ok((pos, spec))
    }

    /// Evaluate a filter. `None` means the node constrains nothing (stop words only).
    fn eval(&self, node: &QueryNode) -> Result<Option<Matches>> {
        self.check_cancel()?;
        match node {
            QueryNode::All => Ok(Some(Matches::unscored(self.data.docs.all().clone()))),
            QueryNode::Term(term) => self.eval_term(term),
            QueryNode::Tags { field, values } => {
                let (pos, _) = self.resolve(field, "tag", |k| matches!(k, FieldKind::Tag { .. }))?;
                let FieldStructure::Tag(tags) = &self.data.fields[pos] else {
                    return Ok(Some(Matches::default()));
                };
                Ok(Some(Matches::unscored(tags.lookup_any(values))))
            }
            QueryNode::Range { field, min, max } => {
                let (pos, _) = self.resolve(field, "numeric", |k| matches!(k, FieldKind::Numeric))?;
                let FieldStructure::Numeric(numbers) = &self.data.fields[pos] else {
                    return Ok(Some(Matches::default()));
                };
                Ok(Some(Matches::unscored(numbers.range(*min, *max))))
            }
            QueryNode::Geo {
                field,
                center,
                radius,
                unit,
            } => {
                let (pos, _) = self.resolve(field, "geo", |k| matches!(k, FieldKind::Geo))?;
                let FieldStructure::Geo(points) = &self.data.fields[pos] else {
                    return Ok(Some(Matches::default()));
                };
                Ok(Some(Matches::unscored(
                    points.within_radius(center, unit.to_meters(*radius)),
                )))
            }
            QueryNode::And(children) => {
                let mut acc: Option<Matches> = None;
                let mut excluded = RoaringBitmap::new();
                let mut any_excluded = false;
                for child in children {
                    if let QueryNode::Not(inner) = child {
                        if let Some(m) = self.eval(inner)? {
                            excluded |= m.docs;
                            any_excluded = true;
                        }
                        continue;
                    }
                    if let Some(m) = self.eval(child)? {
                        acc = Some(match acc {
                            Some(a) => a.and(m),
                            None => m,
                        });
                    }
                }
                let mut acc = match acc {
                    Some(a) => a,
                    None if any_excluded => Matches::unscored(self.data.docs.all().clone()),
                    None => return Ok(None),
                };
                if any_excluded {
                    acc.docs -= &excluded;
                    let docs = &acc.docs;
                    acc.scores.retain(|doc, _| docs.contains(*doc));
                }
                Ok(Some(acc))
            }
            QueryNode::Or(children) => {
                let mut acc: Option<Matches> = None;
                for child in children {
                    if let Some(m) = self.eval(child)? {
                        acc = Some(match acc {
                            Some(a) => a.or(m),
                            None => m,
                        });
                    }
                }
                Ok(acc)
            }
            QueryNode::Not(inner) => {
                let Some(m) = self.eval(inner)? else {
                    return Ok(None);
                };
                Ok(Some(Matches::unscored(self.data.docs.all() - &m.docs)))
            }
        }
    }

    /// A term is the conjunction of its tokenized pieces. Stemmed fields are
    /// searched with the stemmed piece, `nostem` fields with the raw one.
    fn eval_term(&self, term: &TermQuery) -> Result<Option<Matches>> {
        let mut stemmed: Vec<u16> = Vec::new();
        let mut raw: Vec<u16> = Vec::new();
        match &term.field {
            Some(field) => {
                let (pos, spec) = self.resolve(field, "text", |k| matches!(k, FieldKind::Text { .. }))?;
                if let FieldKind::Text { nostem, .. } = spec.kind {
                    if nostem { raw.push(pos as u16) } else { stemmed.push(pos as u16) }
                }
            }
            None => {
                for (pos, spec) in self.index.definition().fields.iter().enumerate() {
                    if let FieldKind::Text { nostem, .. } = spec.kind {
                        if nostem { raw.push(pos as u16) } else { stemmed.push(pos as u16) }
                    }
                }
            }
        }
        let all_fields: Vec<u16> = stemmed.iter().chain(raw.iter()).copied().collect();
        let weights = self.index.weights();
        let text = &self.data.text;

        let lowered = term.word.to_lowercase();
        let pieces: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|p| !p.is_empty())
            .collect();
        if pieces.is_empty() {
            return Err(TesseraError::malformed(term.position, "term has no searchable characters"));
        }

        let mut acc: Option<Matches> = None;
        for (i, piece) in pieces.iter().enumerate() {
            let is_prefix = term.prefix && i + 1 == pieces.len();
            let matches = if is_prefix {
                let mut scores: HashMap<u32, f32> = HashMap::new();
                for expanded in text.expand_prefix(piece, MAX_PREFIX_EXPANSIONS) {
                    for (doc, s) in text.score_term(expanded, Some(all_fields.as_slice()), weights) {
                        *scores.entry(doc).or_insert(0.0) += s;
                    }
                }
                Matches::scored(scores)
            } else {
                if self.tokenizer.is_stop_word(piece) {
                    continue;
                }
                let mut scores: HashMap<u32, f32> = HashMap::new();
                for (fields, stem) in [(&stemmed, true), (&raw, false)] {
                    if fields.is_empty() {
                        continue;
                    }
                    let normalized = self.tokenizer.normalize(piece, stem);
                    for (doc, s) in text.score_term(&normalized, Some(fields.as_slice()), weights) {
                        *scores.entry(doc).or_insert(0.0) += s;
                    }
                }
                Matches::scored(scores)
            };
            acc = Some(match acc {
                Some(a) => a.and(matches),
                None => matches,
            });
        }
        Ok(acc)
    }

    fn sort_by_score(&self, candidates: &mut [Candidate<'a>], ascending: bool) {
        candidates.sort_by(|a, b| {
            let (sa, sb) = (a.score.unwrap_or(f32::MAX), b.score.unwrap_or(f32::MAX));
            let ord = sa.total_cmp(&sb);
            let ord = if ascending { ord } else { ord.reverse() };
            ord.then_with(|| a.key.cmp(b.key))
        });
    }

    /// Sort by a field value. Documents without the field go last either way.
    fn sort_by_field(&self, candidates: &mut Vec<Candidate<'a>>, field: &str, ascending: bool) -> Result<()> {
        let definition = self.index.definition();
        let Some(pos) = definition.fields.iter().position(|f| f.name() == field) else {
            return Err(TesseraError::malformed(0, format!("unknown sort field '{field}'")));
        };
        let spec = &definition.fields[pos];
        if matches!(spec.kind, FieldKind::Vector(_) | FieldKind::Geo) {
            return Err(TesseraError::malformed(
                0,
                format!("cannot sort by {} field '{field}'", spec.kind.type_name()),
            ));
        }

        let cancel = self.options.cancel.as_ref();
        let mut keyed: Vec<(Option<SortValue>, Candidate<'a>)> = Vec::with_capacity(candidates.len());
        for (step, c) in candidates.drain(..).enumerate() {
            check_every(cancel, step, 1024)?;
            let value = match &self.data.fields[pos] {
                FieldStructure::Numeric(numbers) => numbers.value_of(c.doc_id).map(SortValue::Number),
                _ => self.store.get(c.key).and_then(|doc| match doc.fields.get(&spec.path) {
                    Some(FieldValue::Text(s)) => Some(SortValue::Text(s.to_lowercase())),
                    Some(FieldValue::Tags(t)) => Some(SortValue::Text(t.join(",").to_lowercase())),
                    Some(FieldValue::Number(n)) => Some(SortValue::Number(*n)),
                    _ => None,
                }),
            };
            keyed.push((value, c));
        }

        keyed.sort_by(|(va, a), (vb, b)| {
            let ord = match (va, vb) {
                (Some(x), Some(y)) => {
                    let ord = cmp_sort_values(x, y);
                    if ascending { ord } else { ord.reverse() }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            ord.then_with(|| a.key.cmp(b.key))
        });
        candidates.extend(keyed.into_iter().map(|(_, c)| c));
        Ok(())
    }

    fn hit(&self, candidate: Candidate<'a>, score_alias: Option<&str>) -> Option<SearchHit> {
        let doc = self.store.get(candidate.key)?;
        let definition = self.index.definition();
        let mut fields: Fields = match &self.options.return_fields {
            None => doc.fields,
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let path = definition
                        .field_by_name(name)
                        .map_or(name.as_str(), |f| f.path.as_str());
                    doc.fields.get(path).map(|v| (name.clone(), v.clone()))
                })
                .collect(),
        };

        if let (Some(alias), Some(score)) = (score_alias, candidate.score) {
            let wanted = self
                .options
                .return_fields
                .as_ref()
                .map_or(true, |names| names.iter().any(|n| n == alias));
            if wanted {
                fields.insert(alias.to_string(), FieldValue::Number(score as f64));
            }
        }

        Some(SearchHit {
            key: candidate.key.to_string(),
            score: candidate.score,
            fields,
        })
    }
}

/// Name under which KNN distances are returned.
pub fn score_alias(knn: &KnnClause) -> String {
    knn.alias
        .clone()
        .unwrap_or_else(|| format!("__{}_score", knn.field.name))
}
