//! HTTP router assembly.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;
use crate::{api, middleware};

/// Builds the routed application with the middleware stack applied
/// outside-in: logging, response compression, subnet filter, body size
/// limit, request decompression, decryption, signature check, router.
pub fn build_router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/ping", get(api::health))
        .route(
            "/update/{type}/{name}/{value}",
            post(api::update_metric_text),
        )
        .route("/update", post(api::update_metric_json))
        .route("/update/", post(api::update_metric_json))
        .route("/updates", post(api::update_metrics_json))
        .route("/updates/", post(api::update_metrics_json))
        .route("/value/{type}/{name}", get(api::get_metric_text))
        .route("/value", post(api::get_metric_json))
        .route("/value/", post(api::get_metric_json))
        .route("/", get(api::index))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::signature_check,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::decryption))
        .layer(from_fn(middleware::decompression))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(from_fn_with_state(state.clone(), middleware::subnet_filter))
        .layer(CompressionLayer::new())
        .layer(from_fn(middleware::request_logging))
        .with_state(state)
}
