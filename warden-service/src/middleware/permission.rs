use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::models::Principal;
use crate::services::Logical;
use crate::AppState;
use warden_core::error::AppError;

/// Permission codes a route demands, with And/Or combination. Attached per
/// route via `route_layer`.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    pub codes: Vec<String>,
    pub logical: Logical,
}

impl PermissionPolicy {
    pub fn require(code: &str) -> Self {
        Self {
            codes: vec![code.to_string()],
            logical: Logical::And,
        }
    }

    pub fn any_of(codes: &[&str]) -> Self {
        Self {
            codes: codes.iter().map(|s| s.to_string()).collect(),
            logical: Logical::Or,
        }
    }

    pub fn all_of(codes: &[&str]) -> Self {
        Self {
            codes: codes.iter().map(|s| s.to_string()).collect(),
            logical: Logical::And,
        }
    }
}

/// Enforce a [`PermissionPolicy`] against the authenticated principal. Must
/// run inside the auth middleware.
pub async fn require_permissions(
    State((state, policy)): State<(AppState, PermissionPolicy)>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("principal missing from request extensions"))
        })?;

    let codes: Vec<&str> = policy.codes.iter().map(String::as_str).collect();
    state
        .gate
        .authorize_all(&principal, &codes, policy.logical)
        .await?;

    Ok(next.run(req).await)
}
