use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::SearchCommands;
use crate::schema::{definition_from_json, IndexInfo};
use crate::server::AppState;

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct ListIndexesResponse {
    pub indexes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DropIndexParams {
    #[serde(default)]
    pub delete_documents: bool,
}

/// The body is an index definition. Decoding goes through
/// `definition_from_json` so shape errors surface as field spec errors.
pub async fn create_index(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<IndexInfo>), ApiError> {
    let definition = definition_from_json(body)?;
    let name = definition.name.clone();
    let info = state
        .run(move |engine| {
            engine.define_index(definition)?;
            engine.index_info(&name)
        })
        .await?;

    info!(index = %info.definition.name, docs = info.num_docs, "index created via api");
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn list_indexes(State(state): State<AppState>) -> Json<ListIndexesResponse> {
    Json(ListIndexesResponse {
        indexes: state.engine.list_indexes(),
    })
}

pub async fn get_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<IndexInfo>, ApiError> {
    Ok(Json(state.engine.index_info(&name)?))
}

pub async fn drop_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DropIndexParams>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |engine| engine.drop_index(&name, params.delete_documents))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
