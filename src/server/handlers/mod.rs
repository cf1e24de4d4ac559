pub mod documents;
pub mod health;
pub mod indexes;
pub mod metrics;
pub mod search;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::TesseraError;

/// Wrapper that converts `TesseraError` into an HTTP response.
///
/// The body carries the message, the variant name and the status, plus the
/// offset for malformed queries.
pub struct ApiError(pub TesseraError);

impl From<TesseraError> for ApiError {
    fn from(e: TesseraError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
            "status": status,
        });
        if let TesseraError::MalformedQuery { position, .. } = &self.0 {
            body["position"] = json!(position);
        }
        if status >= 500 {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            axum::Json(body),
        )
            .into_response()
    }
}
