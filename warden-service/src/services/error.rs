use crate::services::store::StoreError;
use thiserror::Error;
use warden_core::error::AppError;

/// Engine error taxonomy. Identity failures map to 401, known-identity
/// policy denials to 403, transient directory trouble to 503.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Session has been revoked")]
    SessionRevoked,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Directory unavailable")]
    DirectoryUnavailable,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::unauthorized("invalid_credentials", "Invalid credentials")
            }
            ServiceError::TokenInvalid => AppError::unauthorized("token_invalid", "Invalid token"),
            ServiceError::TokenExpired => AppError::unauthorized("token_expired", "Token expired"),
            ServiceError::SessionRevoked => {
                AppError::unauthorized("session_revoked", "Session has been revoked")
            }
            ServiceError::AccountDisabled => {
                AppError::forbidden("account_disabled", "Account is disabled")
            }
            ServiceError::AccountLocked => {
                AppError::forbidden("account_locked", "Account is locked")
            }
            ServiceError::PermissionDenied => {
                AppError::forbidden("permission_denied", "Permission denied")
            }
            ServiceError::SessionNotFound => {
                AppError::NotFound(anyhow::anyhow!("Session not found"))
            }
            ServiceError::DirectoryUnavailable => AppError::ServiceUnavailable,
            ServiceError::Storage(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
