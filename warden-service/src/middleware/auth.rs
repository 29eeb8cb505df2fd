use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::models::Principal;
use crate::AppState;
use warden_core::error::AppError;

/// The bearer credential exactly as presented, kept for logout.
#[derive(Debug, Clone)]
pub struct RawCredential(pub String);

/// Require a valid, unrevoked access credential. The validated principal and
/// the raw credential land in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header_name = state.config.auth.header_name.as_str();
    let prefix = state.config.auth.header_prefix.as_str();

    let credential = req
        .headers()
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(prefix))
        .map(str::to_string);

    let Some(credential) = credential else {
        return Err(AppError::unauthorized(
            "token_invalid",
            "Missing or invalid Authorization header",
        ));
    };

    let principal = state.gate.authenticate(&credential).await?;

    req.extensions_mut().insert(principal);
    req.extensions_mut().insert(RawCredential(credential));

    Ok(next.run(req).await)
}

/// Extractor for the authenticated principal placed by [`auth_middleware`].
pub struct CurrentUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("principal missing from request extensions"))
                .into_response()
        })?;

        Ok(CurrentUser(principal))
    }
}
