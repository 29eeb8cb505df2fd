use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use std::net::SocketAddr;

use crate::dtos::{LoginRequest, LogoutRequest, RefreshRequest};
use crate::middleware::RawCredential;
use crate::services::TokenResponse;
use crate::utils::ValidatedJson;
use crate::AppState;
use warden_core::error::AppError;

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let device = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let client_ip = client_ip(&headers, connect_info);

    let (_, tokens) = state
        .auth
        .login(&payload.username, &payload.password, device, &client_ip)
        .await?;

    Ok(Json(tokens))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let tokens = state.registry.refresh(&payload.refresh_token).await?;
    Ok(Json(tokens))
}

/// POST /auth/logout (authenticated)
pub async fn logout(
    State(state): State<AppState>,
    Extension(RawCredential(credential)): Extension<RawCredential>,
    ValidatedJson(payload): ValidatedJson<LogoutRequest>,
) -> Result<StatusCode, AppError> {
    state.auth.logout(&credential, &payload.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Client IP: first `x-forwarded-for` entry, else the socket address.
fn client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
