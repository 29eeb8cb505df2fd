use axum::{extract::State, http::StatusCode, Json};

use crate::dtos::HealthResponse;
use crate::AppState;

/// GET /health pings the session store and the revocation index.
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let degraded = |what: &str, e: &dyn std::fmt::Display| {
        tracing::error!(component = what, error = %e, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded".to_string(),
                version: state.config.service_version.clone(),
            }),
        )
    };

    if let Err(e) = state.registry.store_health().await {
        return Err(degraded("session_store", &e));
    }
    if let Err(e) = state.gate.index_health().await {
        return Err(degraded("revocation_index", &e));
    }

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: state.config.service_version.clone(),
    }))
}
