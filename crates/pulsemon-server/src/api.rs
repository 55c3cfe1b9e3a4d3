//! HTTP handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use pulsemon_common::error::MetricsError;
use pulsemon_common::metric::{Metric, MetricQuery};

use crate::state::AppState;

fn error_response(err: &MetricsError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

fn json_response<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /ping` — repository health check.
pub async fn health(State(state): State<AppState>) -> Response {
    match state.service.health_check().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "registry health check failed");
            error_response(&e)
        }
    }
}

/// `POST /update/{type}/{name}/{value}` — single text upsert.
pub async fn update_metric_text(
    State(state): State<AppState>,
    Path((kind_tag, name, value)): Path<(String, String, String)>,
) -> Response {
    match state.service.update_metric(&kind_tag, &name, &value).await {
        Ok(metric) => {
            state.save_sync();
            (StatusCode::OK, metric.value_text()).into_response()
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to update metric");
            error_response(&e)
        }
    }
}

/// `POST /update/` — single JSON upsert; responds with the stored metric.
pub async fn update_metric_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            return error_response(&MetricsError::BadData(format!("invalid metric JSON: {e}")))
        }
    };

    match state
        .service
        .update_metric(&metric.kind().to_string(), &metric.id, &metric.value_text())
        .await
    {
        Ok(updated) => {
            state.save_sync();
            json_response(&updated)
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to update metric");
            error_response(&e)
        }
    }
}

/// `POST /updates/` — bulk JSON upsert; responds with the post-write
/// snapshot in input order.
pub async fn update_metrics_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metrics: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            return error_response(&MetricsError::BadData(format!("invalid metrics JSON: {e}")))
        }
    };

    match state.service.update_metrics(metrics).await {
        Ok(updated) => {
            state.save_sync();
            json_response(&updated)
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to update metrics");
            error_response(&e)
        }
    }
}

/// `GET /value/{type}/{name}` — read one value as text.
pub async fn get_metric_text(
    State(state): State<AppState>,
    Path((kind_tag, name)): Path<(String, String)>,
) -> Response {
    match state.service.get_metric(&name, &kind_tag).await {
        Ok(metric) => (StatusCode::OK, metric.value_text()).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "failed to get metric");
            error_response(&e)
        }
    }
}

/// `POST /value/` — read one metric as JSON.
pub async fn get_metric_json(State(state): State<AppState>, body: Bytes) -> Response {
    let query: MetricQuery = match serde_json::from_slice(&body) {
        Ok(q) => q,
        Err(e) => {
            return error_response(&MetricsError::BadData(format!("invalid query JSON: {e}")))
        }
    };

    match state
        .service
        .get_metric(&query.id, &query.kind.to_string())
        .await
    {
        Ok(metric) => json_response(&metric),
        Err(e) => {
            tracing::debug!(error = %e, "failed to get metric");
            error_response(&e)
        }
    }
}

/// `GET /` — HTML table of all metrics.
pub async fn index(State(state): State<AppState>) -> Response {
    match state.service.get_all_metrics().await {
        Ok(metrics) => Html(render_metrics_table(&metrics)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render metrics table");
            error_response(&e)
        }
    }
}

fn render_metrics_table(metrics: &[Metric]) -> String {
    let mut rows = String::new();
    for m in metrics {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&m.id),
            m.kind(),
            m.value_text()
        ));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n\
         <table border=\"1\">\n<tr><th>Name</th><th>Type</th><th>Value</th></tr>\n\
         {rows}</table>\n</body>\n</html>\n"
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
