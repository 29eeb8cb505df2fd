//! Session registry: refresh-session lifecycle and policy enforcement.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use warden_core::retry::RetryConfig;

use crate::models::{
    Principal, PrincipalStatus, RefreshSession, RevokeReason, SessionInfo, SessionPolicy,
};
use crate::services::directory::{directory_read, Directory};
use crate::services::error::ServiceError;
use crate::services::metrics;
use crate::services::revocation::RevocationIndex;
use crate::services::store::{SessionStore, StoreError};
use crate::services::token::{TokenIssuer, TokenResponse};

/// Attempts at minting a storage-unique refresh token before giving up.
const TOKEN_COLLISION_RETRIES: u32 = 3;

pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn Directory>,
    issuer: TokenIssuer,
    revocations: Arc<dyn RevocationIndex>,
    policy: SessionPolicy,
    refresh_ttl_days: i64,
    retry: RetryConfig,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn Directory>,
        issuer: TokenIssuer,
        revocations: Arc<dyn RevocationIndex>,
        policy: SessionPolicy,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            store,
            directory,
            issuer,
            revocations,
            policy,
            refresh_ttl_days,
            retry: RetryConfig::quick(),
        }
    }

    /// Create a refresh session for a principal, applying the single-login /
    /// max-session policy atomically. Tokens of evicted sessions go straight
    /// to the revocation index.
    pub async fn create_session(
        &self,
        principal: &Principal,
        device: &str,
        client_ip: &str,
    ) -> Result<RefreshSession, ServiceError> {
        let mut attempt = 0;
        loop {
            let now = Utc::now();
            let session = RefreshSession {
                session_id: Uuid::new_v4(),
                token: self.issuer.issue_refresh(),
                principal_id: principal.id,
                username: principal.username.clone(),
                device: device.to_string(),
                client_ip: client_ip.to_string(),
                issued_utc: now,
                expires_utc: now + Duration::days(self.refresh_ttl_days),
                last_used_utc: now,
                revoked: false,
                revoked_utc: None,
                revoked_reason: None,
            };

            match self.store.insert_with_policy(&session, &self.policy).await {
                Ok(evicted) => {
                    for victim in &evicted {
                        self.index_session_token(victim).await;
                        metrics::record_eviction(
                            victim.revoked_reason.as_deref().unwrap_or("unknown"),
                        );
                    }
                    if !evicted.is_empty() {
                        tracing::info!(
                            principal_id = %principal.id,
                            evicted = evicted.len(),
                            "sessions evicted by login policy"
                        );
                    }
                    return Ok(session);
                }
                Err(StoreError::DuplicateToken) if attempt < TOKEN_COLLISION_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, "refresh token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Exchange a refresh token for a fresh access credential. The refresh
    /// token itself is not rotated.
    pub async fn refresh(&self, raw_token: &str) -> Result<TokenResponse, ServiceError> {
        let revoked = self
            .revocations
            .is_revoked(raw_token)
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("revocation index: {}", e)))?;
        if revoked {
            return Err(ServiceError::SessionRevoked);
        }

        let session = self
            .store
            .find_by_token(raw_token)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        if session.revoked {
            return Err(ServiceError::SessionRevoked);
        }
        if session.is_expired() {
            return Err(ServiceError::TokenExpired);
        }

        // Roles and status may have changed since login; re-derive.
        let principal = directory_read(&self.retry, "load_principal", || {
            self.directory.load_principal(session.principal_id)
        })
        .await?
        .ok_or(ServiceError::TokenInvalid)?;

        match principal.status {
            PrincipalStatus::Active => {}
            PrincipalStatus::Disabled => return Err(ServiceError::AccountDisabled),
            PrincipalStatus::Locked => return Err(ServiceError::AccountLocked),
            PrincipalStatus::Deleted => return Err(ServiceError::TokenInvalid),
        }

        self.store.touch(session.session_id, Utc::now()).await?;

        let access_token = self.issuer.issue_access(&principal)?;
        Ok(TokenResponse::new(
            access_token,
            session.token,
            self.issuer.access_ttl_seconds(),
        ))
    }

    /// Revoke one session by id. Revoking an already-revoked session is a
    /// no-op success; a session that never existed is reported.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevokeReason,
    ) -> Result<(), ServiceError> {
        let session = self
            .store
            .find_by_id(session_id)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        if session.revoked {
            return Ok(());
        }

        if let Some(revoked) = self.store.revoke(session_id, reason, Utc::now()).await? {
            self.index_session_token(&revoked).await;
            metrics::record_eviction(reason.as_str());
        }
        Ok(())
    }

    /// Revoke by token. Unknown tokens are a no-op success: logout never
    /// fails.
    pub async fn revoke_by_token(
        &self,
        raw_token: &str,
        reason: RevokeReason,
    ) -> Result<(), ServiceError> {
        if let Some(revoked) = self
            .store
            .revoke_by_token(raw_token, reason, Utc::now())
            .await?
        {
            self.index_session_token(&revoked).await;
            metrics::record_eviction(reason.as_str());
        }
        Ok(())
    }

    /// Revoke every active session of a principal. Returns the count.
    pub async fn revoke_all(
        &self,
        principal_id: Uuid,
        reason: RevokeReason,
    ) -> Result<usize, ServiceError> {
        let revoked = self
            .store
            .revoke_all(principal_id, reason, Utc::now())
            .await?;
        for session in &revoked {
            self.index_session_token(session).await;
            metrics::record_eviction(reason.as_str());
        }
        tracing::info!(
            %principal_id,
            reason = reason.as_str(),
            count = revoked.len(),
            "revoked all sessions for principal"
        );
        Ok(revoked.len())
    }

    /// Delete rows expired before the cutoff. Delete-only; safe to run
    /// concurrently with normal traffic.
    pub async fn sweep_expired(&self, before: DateTime<Utc>) -> Result<u64, ServiceError> {
        Ok(self.store.delete_expired_before(before).await?)
    }

    pub async fn find_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<RefreshSession>, ServiceError> {
        Ok(self.store.find_by_id(session_id).await?)
    }

    pub async fn active_sessions(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<SessionInfo>, ServiceError> {
        let sessions = self.store.active_for_principal(principal_id).await?;
        Ok(sessions.iter().map(SessionInfo::from).collect())
    }

    pub async fn page_sessions(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SessionInfo>, ServiceError> {
        let sessions = self.store.page_active(offset, limit).await?;
        Ok(sessions.iter().map(SessionInfo::from).collect())
    }

    pub async fn count_active(&self) -> Result<i64, ServiceError> {
        Ok(self.store.count_active().await?)
    }

    pub async fn store_health(&self) -> Result<(), ServiceError> {
        Ok(self.store.health_check().await?)
    }

    /// Index a revoked session's token for its remaining lifetime so refresh
    /// attempts die immediately. Index failures are logged, not fatal: the
    /// store row is already revoked and refresh re-checks it.
    async fn index_session_token(&self, session: &RefreshSession) {
        let ttl = session.remaining_ttl_seconds();
        let reason = session.revoked_reason.as_deref().unwrap_or("revoked");
        if let Err(e) = self.revocations.revoke(&session.token, ttl, reason).await {
            tracing::error!(
                session_id = %session.session_id,
                error = %e,
                "failed to index revoked session token"
            );
        } else {
            metrics::record_revocation();
        }
    }
}

/// Periodic sweep of long-expired session rows. Errors are logged and the
/// loop continues.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    interval_minutes: u64,
    retention_days: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_minutes.max(1) * 60);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;

        loop {
            interval.tick().await;
            let cutoff = Utc::now() - Duration::days(retention_days);
            match registry.sweep_expired(cutoff).await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "swept expired refresh sessions");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "session sweep failed");
                }
            }
        }
    })
}
