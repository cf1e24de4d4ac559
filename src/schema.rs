//! Index definitions: which fields of which documents get indexed, and how.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, TesseraError};
use crate::types::DistanceMetric;

/// Shape of the documents an index reads fields from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Flat field names.
    #[default]
    Hash,
    /// Field paths are JSON paths (`$.a.b`) into flattened JSON documents.
    Json,
}

/// Vector index algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorAlgorithm {
    /// Exact brute-force scan.
    Flat,
    #[default]
    Hnsw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFieldOptions {
    #[serde(default)]
    pub algorithm: VectorAlgorithm,
    pub dim: usize,
    pub distance_metric: DistanceMetric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_runtime: Option<usize>,
}

fn default_weight() -> f32 {
    1.0
}

fn default_separator() -> char {
    ','
}

/// Field type plus its type-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default = "default_weight")]
        weight: f32,
        #[serde(default)]
        nostem: bool,
    },
    Tag {
        #[serde(default = "default_separator")]
        separator: char,
        #[serde(default)]
        case_sensitive: bool,
    },
    Numeric,
    Geo,
    Vector(VectorFieldOptions),
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text { .. } => "text",
            FieldKind::Tag { .. } => "tag",
            FieldKind::Numeric => "numeric",
            FieldKind::Geo => "geo",
            FieldKind::Vector(_) => "vector",
        }
    }
}

/// One indexed field: where to read it, what to call it in queries, how to index it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    fn new(path: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            path: path.into(),
            alias: None,
            kind,
        }
    }

    pub fn text(path: impl Into<String>) -> Self {
        Self::new(
            path,
            FieldKind::Text {
                weight: 1.0,
                nostem: false,
            },
        )
    }

    pub fn tag(path: impl Into<String>) -> Self {
        Self::new(
            path,
            FieldKind::Tag {
                separator: ',',
                case_sensitive: false,
            },
        )
    }

    pub fn numeric(path: impl Into<String>) -> Self {
        Self::new(path, FieldKind::Numeric)
    }

    pub fn geo(path: impl Into<String>) -> Self {
        Self::new(path, FieldKind::Geo)
    }

    pub fn vector(path: impl Into<String>, dim: usize, distance_metric: DistanceMetric) -> Self {
        Self::new(
            path,
            FieldKind::Vector(VectorFieldOptions {
                algorithm: VectorAlgorithm::Hnsw,
                dim,
                distance_metric,
                m: None,
                ef_construction: None,
                ef_runtime: None,
            }),
        )
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Switch a vector field to exact brute-force search.
    pub fn flat(mut self) -> Self {
        if let FieldKind::Vector(ref mut opts) = self.kind {
            opts.algorithm = VectorAlgorithm::Flat;
        }
        self
    }

    /// Override HNSW graph parameters for a vector field.
    pub fn hnsw_params(mut self, m: usize, ef_construction: usize, ef_runtime: usize) -> Self {
        if let FieldKind::Vector(ref mut opts) = self.kind {
            opts.algorithm = VectorAlgorithm::Hnsw;
            opts.m = Some(m);
            opts.ef_construction = Some(ef_construction);
            opts.ef_runtime = Some(ef_runtime);
        }
        self
    }

    /// Disable stemming for a text field.
    pub fn nostem(mut self) -> Self {
        if let FieldKind::Text { ref mut nostem, .. } = self.kind {
            *nostem = true;
        }
        self
    }

    pub fn weight(mut self, w: f32) -> Self {
        if let FieldKind::Text { ref mut weight, .. } = self.kind {
            *weight = w;
        }
        self
    }

    pub fn separator(mut self, sep: char) -> Self {
        if let FieldKind::Tag {
            ref mut separator, ..
        } = self.kind
        {
            *separator = sep;
        }
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        if let FieldKind::Tag {
            ref mut case_sensitive,
            ..
        } = self.kind
        {
            *case_sensitive = true;
        }
        self
    }

    /// Name used in queries: the alias if given, else the path.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.path)
    }
}

/// A named index over every document whose key starts with one of `prefixes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    #[serde(default)]
    pub on: DocumentKind,
    /// Key prefixes. Empty matches every key.
    #[serde(default)]
    pub prefixes: Vec<String>,
    pub fields: Vec<FieldSpec>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: DocumentKind::Hash,
            prefixes: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn on(mut self, kind: DocumentKind) -> Self {
        self.on = kind;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Reject a definition before any index structure is created.
    pub fn validate(&self, max_dimension: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TesseraError::InvalidFieldSpec(
                "index name must not be empty".into(),
            ));
        }
        if self.fields.is_empty() {
            return Err(TesseraError::InvalidFieldSpec(
                "index must define at least one field".into(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.path.is_empty() {
                return Err(TesseraError::InvalidFieldSpec(
                    "field path must not be empty".into(),
                ));
            }
            if self.on == DocumentKind::Json && !field.path.starts_with('$') {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "JSON field path '{}' must start with '$'",
                    field.path
                )));
            }
            if !seen.insert(field.name()) {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "duplicate field name '{}'",
                    field.name()
                )));
            }
            validate_kind(field, max_dimension)?;
        }
        Ok(())
    }
}

fn validate_kind(field: &FieldSpec, max_dimension: usize) -> Result<()> {
    let name = field.name();
    match &field.kind {
        FieldKind::Text { weight, .. } => {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "text field '{name}' weight must be positive"
                )));
            }
        }
        FieldKind::Tag { separator, .. } => {
            if separator.is_alphanumeric() {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "tag field '{name}' separator must not be alphanumeric"
                )));
            }
        }
        FieldKind::Numeric | FieldKind::Geo => {}
        FieldKind::Vector(opts) => {
            if opts.dim == 0 {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "vector field '{name}' dimension must be > 0"
                )));
            }
            if opts.dim > max_dimension {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "vector field '{name}' dimension {} exceeds maximum {max_dimension}",
                    opts.dim
                )));
            }
            if opts.m.is_some_and(|m| m < 2) {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "vector field '{name}' M must be >= 2"
                )));
            }
            if opts.ef_construction == Some(0) || opts.ef_runtime == Some(0) {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "vector field '{name}' ef parameters must be > 0"
                )));
            }
            if opts.algorithm == VectorAlgorithm::Flat
                && (opts.m.is_some() || opts.ef_construction.is_some())
            {
                return Err(TesseraError::InvalidFieldSpec(format!(
                    "vector field '{name}' uses FLAT; graph parameters are not allowed"
                )));
            }
        }
    }
    Ok(())
}

/// Decode a definition from untyped JSON, reporting every problem as a field spec error.
pub fn definition_from_json(value: serde_json::Value) -> Result<IndexDefinition> {
    serde_json::from_value(value).map_err(|e| TesseraError::InvalidFieldSpec(e.to_string()))
}

/// Summary of a registered index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub definition: IndexDefinition,
    pub num_docs: usize,
    pub indexing_failures: usize,
    pub num_terms: usize,
    pub vector_nodes: usize,
    pub created_at: DateTime<Utc>,
}
