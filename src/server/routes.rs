use std::time::Duration;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers::{documents, health, indexes, metrics, search};
use super::AppState;
use crate::metrics::HTTP_REQUESTS_TOTAL;

pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_millis(state.config.server.request_timeout_ms);
    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .route("/healthz", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route(
            "/v1/indexes",
            post(indexes::create_index).get(indexes::list_indexes),
        )
        .route(
            "/v1/indexes/:name",
            get(indexes::get_index).delete(indexes::drop_index),
        )
        .route("/v1/indexes/:name/search", post(search::search_index))
        .route(
            "/v1/documents/:key",
            put(documents::put_document)
                .get(documents::get_document)
                .delete(documents::delete_document),
        )
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(body_limit))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(middleware::from_fn(track_requests))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Count requests by route template, not by raw path.
async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(req).await;
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();
    response
}
