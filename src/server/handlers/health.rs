use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::engine::SearchCommands;
use crate::server::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "documents": state.engine.store().len(),
        "indexes": state.engine.list_indexes().len(),
    }))
}
