//! Authorization gate: the per-request pipeline. Authenticates a bearer
//! credential, answers permission checks, and resolves data scope.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::{Principal, PrincipalStatus};
use crate::services::error::ServiceError;
use crate::services::metrics;
use crate::services::permissions::{Logical, PermissionResolver};
use crate::services::revocation::{credential_key, RevocationIndex};
use crate::services::scope::{DataScopeResolver, QueryPredicate, ScopeDecision};
use crate::services::token::TokenIssuer;

pub struct AuthorizationGate {
    issuer: TokenIssuer,
    revocations: Arc<dyn RevocationIndex>,
    permissions: Arc<PermissionResolver>,
    scopes: Arc<DataScopeResolver>,
}

impl AuthorizationGate {
    pub fn new(
        issuer: TokenIssuer,
        revocations: Arc<dyn RevocationIndex>,
        permissions: Arc<PermissionResolver>,
        scopes: Arc<DataScopeResolver>,
    ) -> Self {
        Self {
            issuer,
            revocations,
            permissions,
            scopes,
        }
    }

    /// Validate an access credential and rehydrate its principal. The
    /// revocation check fails closed: if the index cannot answer, the
    /// request does not proceed.
    pub async fn authenticate(&self, raw_credential: &str) -> Result<Principal, ServiceError> {
        let claims = self.issuer.validate_access(raw_credential)?;

        let revoked = self
            .revocations
            .is_revoked(&credential_key(raw_credential))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("revocation index: {}", e)))?;
        if revoked {
            return Err(ServiceError::SessionRevoked);
        }

        // Claims carry no department; scope resolution loads it on demand.
        Ok(Principal {
            id: claims.sub,
            display_name: claims.username.clone(),
            username: claims.username,
            status: PrincipalStatus::Active,
            roles: claims.roles,
            dept_id: None,
        })
    }

    /// Require one permission code; a miss is `PermissionDenied`.
    pub async fn authorize(&self, principal: &Principal, code: &str) -> Result<(), ServiceError> {
        if self.permissions.has_permission(principal, code).await? {
            return Ok(());
        }
        metrics::record_denial();
        tracing::debug!(
            principal = %principal.username,
            code,
            "permission denied"
        );
        Err(ServiceError::PermissionDenied)
    }

    /// Require a set of permission codes under And/Or logic.
    pub async fn authorize_all(
        &self,
        principal: &Principal,
        codes: &[&str],
        logical: Logical,
    ) -> Result<(), ServiceError> {
        if self.permissions.check(principal, codes, logical).await? {
            return Ok(());
        }
        metrics::record_denial();
        tracing::debug!(
            principal = %principal.username,
            ?codes,
            ?logical,
            "permission denied"
        );
        Err(ServiceError::PermissionDenied)
    }

    pub async fn permissions_for(
        &self,
        principal: &Principal,
    ) -> Result<Arc<BTreeSet<String>>, ServiceError> {
        self.permissions.permissions_for(principal).await
    }

    pub async fn scope(&self, principal: &Principal) -> Result<ScopeDecision, ServiceError> {
        self.scopes.resolve(principal).await
    }

    pub async fn scope_predicate(
        &self,
        principal: &Principal,
        dept_column: &str,
        creator_column: &str,
    ) -> Result<QueryPredicate, ServiceError> {
        let decision = self.scopes.resolve(principal).await?;
        Ok(self
            .scopes
            .predicate(&decision, principal, dept_column, creator_column))
    }

    /// Shadow an access credential for the rest of its lifetime. Called at
    /// logout so the credential dies with the session.
    pub async fn revoke_credential(&self, raw_credential: &str) -> Result<(), ServiceError> {
        let Ok(claims) = self.issuer.validate_access(raw_credential) else {
            // Expired or garbage credentials need no shadow entry.
            return Ok(());
        };

        let ttl = claims.exp - chrono::Utc::now().timestamp();
        self.revocations
            .revoke(&credential_key(raw_credential), ttl, "logout")
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("revocation index: {}", e)))?;
        metrics::record_revocation();
        Ok(())
    }

    pub async fn index_health(&self) -> Result<(), ServiceError> {
        self.revocations
            .health_check()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("revocation index: {}", e)))
    }
}
