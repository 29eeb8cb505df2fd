//! Authentication flows: login and logout.

use std::sync::Arc;
use warden_core::retry::RetryConfig;

use crate::models::{Principal, PrincipalStatus, RevokeReason};
use crate::services::directory::{directory_read, Directory};
use crate::services::error::ServiceError;
use crate::services::gate::AuthorizationGate;
use crate::services::metrics;
use crate::services::registry::SessionRegistry;
use crate::services::token::{TokenIssuer, TokenResponse};
use crate::utils::password::verify_password;

pub struct AuthService {
    directory: Arc<dyn Directory>,
    issuer: TokenIssuer,
    registry: Arc<SessionRegistry>,
    gate: Arc<AuthorizationGate>,
    retry: RetryConfig,
}

impl AuthService {
    pub fn new(
        directory: Arc<dyn Directory>,
        issuer: TokenIssuer,
        registry: Arc<SessionRegistry>,
        gate: Arc<AuthorizationGate>,
    ) -> Self {
        Self {
            directory,
            issuer,
            registry,
            gate,
            retry: RetryConfig::quick(),
        }
    }

    /// Verify credentials and mint a token pair. Unknown usernames and wrong
    /// passwords are indistinguishable to the caller; account-status failures
    /// are reported only after the password verifies.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        device: &str,
        client_ip: &str,
    ) -> Result<(Principal, TokenResponse), ServiceError> {
        let user = directory_read(&self.retry, "find_login_user", || {
            self.directory.find_login_user(username)
        })
        .await?;

        let Some(user) = user else {
            metrics::record_login("failure");
            return Err(ServiceError::InvalidCredentials);
        };

        if user.principal.status == PrincipalStatus::Deleted {
            metrics::record_login("failure");
            return Err(ServiceError::InvalidCredentials);
        }

        if !verify_password(password, &user.password_hash) {
            metrics::record_login("failure");
            tracing::info!(username, "login failed: bad password");
            return Err(ServiceError::InvalidCredentials);
        }

        match user.principal.status {
            PrincipalStatus::Active => {}
            PrincipalStatus::Disabled => {
                metrics::record_login("failure");
                return Err(ServiceError::AccountDisabled);
            }
            PrincipalStatus::Locked => {
                metrics::record_login("failure");
                return Err(ServiceError::AccountLocked);
            }
            PrincipalStatus::Deleted => unreachable!("rejected above"),
        }

        let principal = user.principal;
        let access_token = self.issuer.issue_access(&principal)?;
        let session = self
            .registry
            .create_session(&principal, device, client_ip)
            .await?;

        metrics::record_login("success");
        tracing::info!(
            username = %principal.username,
            session_id = %session.session_id,
            "login succeeded"
        );

        Ok((
            principal,
            TokenResponse::new(access_token, session.token, self.issuer.access_ttl_seconds()),
        ))
    }

    /// End a session: shadow the presented access credential and revoke the
    /// refresh session. Idempotent; an already-dead session logs out cleanly.
    pub async fn logout(
        &self,
        raw_credential: &str,
        refresh_token: &str,
    ) -> Result<(), ServiceError> {
        self.gate.revoke_credential(raw_credential).await?;
        self.registry
            .revoke_by_token(refresh_token, RevokeReason::Logout)
            .await
    }
}
