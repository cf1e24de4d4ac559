use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::engine::{DocumentCommands, WriteMode};
use crate::error::TesseraError;
use crate::server::AppState;
use crate::types::{fields_from_json, Document, Fields};

use super::ApiError;

/// Exactly one of `fields` (typed hash fields) or `json` (an object that is
/// flattened to `$.path` fields) must be given.
#[derive(Debug, Deserialize)]
pub struct PutDocumentRequest {
    #[serde(default)]
    pub fields: Option<Fields>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub merge: bool,
}

#[derive(Debug, Serialize)]
pub struct PutDocumentResponse {
    pub key: String,
    pub version: u64,
}

pub async fn put_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<PutDocumentRequest>,
) -> Result<Json<PutDocumentResponse>, ApiError> {
    let fields = match (req.fields, req.json) {
        (Some(fields), None) => fields,
        (None, Some(json)) => fields_from_json(&json)?,
        _ => {
            return Err(ApiError(TesseraError::invalid_value(
                "body",
                "exactly one of 'fields' or 'json' must be provided",
            )))
        }
    };
    let mode = if req.merge {
        WriteMode::Merge
    } else {
        WriteMode::Replace
    };

    let write_key = key.clone();
    let version = state
        .run(move |engine| engine.put_with(&write_key, fields, mode))
        .await?;
    Ok(Json(PutDocumentResponse { key, version }))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Document>, ApiError> {
    state
        .engine
        .get(&key)
        .map(Json)
        .ok_or(ApiError(TesseraError::DocumentNotFound { key }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let delete_key = key.clone();
    let removed = state
        .run(move |engine| Ok(engine.delete(&delete_key)))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(TesseraError::DocumentNotFound { key }))
    }
}
