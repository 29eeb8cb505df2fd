use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::dtos::{PageQuery, RevokedCountResponse, SessionListResponse, SessionPageResponse};
use crate::middleware::CurrentUser;
use crate::models::{Principal, RevokeReason};
use crate::services::ServiceError;
use crate::AppState;
use warden_core::error::AppError;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<SessionPageResponse>, AppError> {
    let offset = page.offset.unwrap_or(0).max(0);
    let limit = page
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let sessions = state.registry.page_sessions(offset, limit).await?;
    let total = state.registry.count_active().await?;

    Ok(Json(SessionPageResponse {
        sessions,
        offset,
        limit,
        total,
    }))
}

/// GET /users/:id/sessions
pub async fn user_sessions(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(target_id): Path<Uuid>,
) -> Result<Json<SessionListResponse>, AppError> {
    ensure_target_visible(&state, &caller, target_id).await?;
    let sessions = state.registry.active_sessions(target_id).await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// DELETE /sessions/:id
pub async fn kick_session(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = state
        .registry
        .find_session(session_id)
        .await?
        .ok_or(ServiceError::SessionNotFound)?;

    // Anyone may kill their own session; others require data-scope coverage.
    if session.principal_id != caller.id {
        ensure_target_visible(&state, &caller, session.principal_id).await?;
    }

    state
        .registry
        .revoke_session(session_id, RevokeReason::Kickout)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /users/:id/sessions
pub async fn kick_user_sessions(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(target_id): Path<Uuid>,
) -> Result<Json<RevokedCountResponse>, AppError> {
    ensure_target_visible(&state, &caller, target_id).await?;
    let revoked = state
        .registry
        .revoke_all(target_id, RevokeReason::Kickout)
        .await?;
    Ok(Json(RevokedCountResponse { revoked }))
}

/// A target principal is visible when it is the caller, or when the caller's
/// data scope covers the target's department. A self-only scope can never
/// cover another principal, so it denies without a directory round trip.
async fn ensure_target_visible(
    state: &AppState,
    caller: &Principal,
    target_id: Uuid,
) -> Result<(), AppError> {
    if caller.id == target_id {
        return Ok(());
    }

    let decision = state.gate.scope(caller).await?;
    match decision.scope {
        crate::models::DataScope::All => return Ok(()),
        crate::models::DataScope::SelfOnly => {
            return Err(ServiceError::PermissionDenied.into());
        }
        _ => {}
    }

    let target = state
        .directory
        .load_principal(target_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "directory read failed");
            AppError::ServiceUnavailable
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown principal")))?;

    if decision.permits_dept(target.dept_id) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied.into())
    }
}
