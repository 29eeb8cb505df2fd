use axum::http::{header, HeaderMap, HeaderValue, StatusCode};

use crate::services::metrics;

/// GET /metrics in Prometheus text exposition format.
pub async fn metrics_handler() -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    (StatusCode::OK, headers, metrics::render())
}
