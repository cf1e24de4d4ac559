use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::cancel::CancelToken;
use crate::engine::SearchCommands;
use crate::error::TesseraError;
use crate::query::{QueryParam, SearchOptions, SortBy, DEFAULT_LIMIT};
use crate::server::AppState;
use crate::types::SearchResults;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub params: HashMap<String, QueryParam>,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub return_fields: Option<Vec<String>>,
    /// Abort the search after this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[instrument(skip(state, req), fields(index = %name, limit = req.limit))]
pub async fn search_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResults>, ApiError> {
    let max_limit = state.config.server.max_limit;
    if req.limit > max_limit {
        return Err(ApiError(TesseraError::malformed(
            0,
            format!("limit {} exceeds maximum of {max_limit}", req.limit),
        )));
    }

    let timeout_ms = req
        .timeout_ms
        .unwrap_or(state.config.server.request_timeout_ms);
    let options = SearchOptions {
        params: req.params,
        sort_by: req.sort_by,
        offset: req.offset,
        limit: req.limit,
        return_fields: req.return_fields,
        cancel: Some(CancelToken::with_timeout(Duration::from_millis(timeout_ms))),
    };
    let query = req.query;

    let results = state
        .run(move |engine| engine.search(&name, &query, &options))
        .await?;
    Ok(Json(results))
}
