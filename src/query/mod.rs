//! Query language and execution.

pub mod executor;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cancel::CancelToken;

pub use parser::{parse, ParsedQuery, QueryNode};

/// Default page size.
pub const DEFAULT_LIMIT: usize = 10;

/// A value bound to a `$name` placeholder in the query string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Number(f64),
    Text(String),
    Vector(Vec<f32>),
}

impl From<Vec<f32>> for QueryParam {
    fn from(v: Vec<f32>) -> Self {
        QueryParam::Vector(v)
    }
}

impl From<&[f32]> for QueryParam {
    fn from(v: &[f32]) -> Self {
        QueryParam::Vector(v.to_vec())
    }
}

impl From<f64> for QueryParam {
    fn from(n: f64) -> Self {
        QueryParam::Number(n)
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        QueryParam::Text(s.to_string())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    #[serde(default = "default_true")]
    pub ascending: bool,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Everything about a search besides the query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub params: HashMap<String, QueryParam>,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Restrict returned fields (field names or aliases). `None` returns all.
    #[serde(default)]
    pub return_fields: Option<Vec<String>>,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
            sort_by: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
            return_fields: None,
            cancel: None,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort_by = Some(SortBy {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn paging(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn return_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
