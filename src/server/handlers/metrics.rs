use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};

use crate::engine::SearchCommands;
use crate::metrics::{DOCUMENTS_STORED, INDEX_DOCUMENTS};
use crate::server::AppState;

/// Refresh the size gauges, then render the default registry.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.engine;
    DOCUMENTS_STORED.set(engine.store().len() as i64);
    INDEX_DOCUMENTS.reset();
    for name in engine.list_indexes() {
        // Dropped between listing and lookup.
        if let Ok(info) = engine.index_info(&name) {
            INDEX_DOCUMENTS
                .with_label_values(&[name.as_str()])
                .set(info.num_docs as i64);
        }
    }

    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buf) {
        tracing::error!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
        buf,
    )
        .into_response()
}
