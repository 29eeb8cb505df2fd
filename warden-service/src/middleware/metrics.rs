use axum::{extract::Request, middleware::Next, response::Response};

use crate::services::metrics;

/// Count every request by method, matched path and status.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;
    metrics::observe_http(&method, &path, response.status().as_u16());
    response
}
