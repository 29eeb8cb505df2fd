//! Session store seam: the only mutable shared state in the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{RefreshSession, RevokeReason, SessionPolicy};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint hit on the token column; caller regenerates.
    #[error("duplicate session token")]
    DuplicateToken,

    #[error("session store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.is_unique_violation() {
                return StoreError::DuplicateToken;
            }
        }
        StoreError::Backend(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session, applying the policy atomically with respect to the
    /// principal's other active sessions. Returns the sessions evicted by
    /// the policy so the caller can index their tokens.
    async fn insert_with_policy(
        &self,
        session: &RefreshSession,
        policy: &SessionPolicy,
    ) -> Result<Vec<RefreshSession>, StoreError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshSession>, StoreError>;

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<RefreshSession>, StoreError>;

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Mark revoked; returns the session only when this call flipped it.
    async fn revoke(
        &self,
        session_id: Uuid,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError>;

    async fn revoke_by_token(
        &self,
        token: &str,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError>;

    /// Revoke every active session of a principal; returns the newly
    /// revoked sessions.
    async fn revoke_all(
        &self,
        principal_id: Uuid,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError>;

    /// Hard-delete rows expired before the cutoff.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Active sessions of a principal, newest first.
    async fn active_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<RefreshSession>, StoreError>;

    /// Active sessions system-wide, newest first.
    async fn page_active(&self, offset: i64, limit: i64)
        -> Result<Vec<RefreshSession>, StoreError>;

    async fn count_active(&self) -> Result<i64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// How many sessions the policy evicts given the current active count.
/// Oldest-first; an over-limit backlog converges to the limit, not to
/// limit-minus-one revocations.
fn eviction_count(active: usize, policy: &SessionPolicy) -> usize {
    if policy.single_login {
        active
    } else if policy.max_sessions > 0 {
        (active + 1).saturating_sub(policy.max_sessions as usize)
    } else {
        0
    }
}

fn eviction_reason(policy: &SessionPolicy) -> RevokeReason {
    if policy.single_login {
        RevokeReason::SingleLogin
    } else {
        RevokeReason::MaxSessions
    }
}

// ==================== Postgres implementation ====================

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert_with_policy(
        &self,
        session: &RefreshSession,
        policy: &SessionPolicy,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row locks serialize concurrent logins for the same principal.
        let active: Vec<RefreshSession> = sqlx::query_as(
            "SELECT * FROM refresh_sessions
             WHERE principal_id = $1 AND revoked = FALSE AND expires_utc > $2
             ORDER BY issued_utc ASC
             FOR UPDATE",
        )
        .bind(session.principal_id)
        .bind(session.issued_utc)
        .fetch_all(&mut *tx)
        .await?;

        let evict = eviction_count(active.len(), policy);
        let reason = eviction_reason(policy);
        let mut evicted = Vec::with_capacity(evict);

        for victim in active.into_iter().take(evict) {
            sqlx::query(
                "UPDATE refresh_sessions
                 SET revoked = TRUE, revoked_utc = $2, revoked_reason = $3
                 WHERE session_id = $1",
            )
            .bind(victim.session_id)
            .bind(session.issued_utc)
            .bind(reason.as_str())
            .execute(&mut *tx)
            .await?;

            evicted.push(RefreshSession {
                revoked: true,
                revoked_utc: Some(session.issued_utc),
                revoked_reason: Some(reason.as_str().to_string()),
                ..victim
            });
        }

        sqlx::query(
            "INSERT INTO refresh_sessions
             (session_id, token, principal_id, username, device, client_ip,
              issued_utc, expires_utc, last_used_utc, revoked, revoked_utc, revoked_reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, NULL, NULL)",
        )
        .bind(session.session_id)
        .bind(&session.token)
        .bind(session.principal_id)
        .bind(&session.username)
        .bind(&session.device)
        .bind(&session.client_ip)
        .bind(session.issued_utc)
        .bind(session.expires_utc)
        .bind(session.last_used_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(evicted)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshSession>, StoreError> {
        Ok(
            sqlx::query_as("SELECT * FROM refresh_sessions WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<RefreshSession>, StoreError> {
        Ok(
            sqlx::query_as("SELECT * FROM refresh_sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE refresh_sessions SET last_used_utc = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke(
        &self,
        session_id: Uuid,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        Ok(sqlx::query_as(
            "UPDATE refresh_sessions
             SET revoked = TRUE, revoked_utc = $2, revoked_reason = $3
             WHERE session_id = $1 AND revoked = FALSE
             RETURNING *",
        )
        .bind(session_id)
        .bind(at)
        .bind(reason.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn revoke_by_token(
        &self,
        token: &str,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        Ok(sqlx::query_as(
            "UPDATE refresh_sessions
             SET revoked = TRUE, revoked_utc = $2, revoked_reason = $3
             WHERE token = $1 AND revoked = FALSE
             RETURNING *",
        )
        .bind(token)
        .bind(at)
        .bind(reason.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn revoke_all(
        &self,
        principal_id: Uuid,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        Ok(sqlx::query_as(
            "UPDATE refresh_sessions
             SET revoked = TRUE, revoked_utc = $2, revoked_reason = $3
             WHERE principal_id = $1 AND revoked = FALSE AND expires_utc > $2
             RETURNING *",
        )
        .bind(principal_id)
        .bind(at)
        .bind(reason.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_utc < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn active_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM refresh_sessions
             WHERE principal_id = $1 AND revoked = FALSE AND expires_utc > $2
             ORDER BY issued_utc DESC",
        )
        .bind(principal_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn page_active(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM refresh_sessions
             WHERE revoked = FALSE AND expires_utc > $3
             ORDER BY issued_utc DESC
             OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_active(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_sessions WHERE revoked = FALSE AND expires_utc > $1",
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ==================== In-memory implementation ====================

/// Single-node store; one lock makes policy enforcement trivially atomic.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, RefreshSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn revoke_in_place(
    session: &mut RefreshSession,
    reason: RevokeReason,
    at: DateTime<Utc>,
) -> RefreshSession {
    session.revoked = true;
    session.revoked_utc = Some(at);
    session.revoked_reason = Some(reason.as_str().to_string());
    session.clone()
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert_with_policy(
        &self,
        session: &RefreshSession,
        policy: &SessionPolicy,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;

        if sessions.values().any(|s| s.token == session.token) {
            return Err(StoreError::DuplicateToken);
        }

        let mut active: Vec<(DateTime<Utc>, Uuid)> = sessions
            .values()
            .filter(|s| {
                s.principal_id == session.principal_id
                    && !s.revoked
                    && s.expires_utc > session.issued_utc
            })
            .map(|s| (s.issued_utc, s.session_id))
            .collect();
        active.sort_by_key(|(issued, _)| *issued);

        let evict = eviction_count(active.len(), policy);
        let reason = eviction_reason(policy);
        let mut evicted = Vec::with_capacity(evict);

        for (_, id) in active.into_iter().take(evict) {
            if let Some(victim) = sessions.get_mut(&id) {
                evicted.push(revoke_in_place(victim, reason, session.issued_utc));
            }
        }

        sessions.insert(session.session_id, session.clone());
        Ok(evicted)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshSession>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.values().find(|s| s.token == token).cloned())
    }

    async fn find_by_id(&self, session_id: Uuid) -> Result<Option<RefreshSession>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(&session_id).cloned())
    }

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(s) = sessions.get_mut(&session_id) {
            s.last_used_utc = at;
        }
        Ok(())
    }

    async fn revoke(
        &self,
        session_id: Uuid,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .get_mut(&session_id)
            .filter(|s| !s.revoked)
            .map(|s| revoke_in_place(s, reason, at)))
    }

    async fn revoke_by_token(
        &self,
        token: &str,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .values_mut()
            .find(|s| s.token == token && !s.revoked)
            .map(|s| revoke_in_place(s, reason, at)))
    }

    async fn revoke_all(
        &self,
        principal_id: Uuid,
        reason: RevokeReason,
        at: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .values_mut()
            .filter(|s| s.principal_id == principal_id && !s.revoked && s.expires_utc > at)
            .map(|s| revoke_in_place(s, reason, at))
            .collect())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_utc >= cutoff);
        Ok((before - sessions.len()) as u64)
    }

    async fn active_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let sessions = self.sessions.lock().await;
        let now = Utc::now();
        let mut out: Vec<RefreshSession> = sessions
            .values()
            .filter(|s| s.principal_id == principal_id && !s.revoked && s.expires_utc > now)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.issued_utc.cmp(&a.issued_utc));
        Ok(out)
    }

    async fn page_active(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let sessions = self.sessions.lock().await;
        let now = Utc::now();
        let mut out: Vec<RefreshSession> = sessions
            .values()
            .filter(|s| !s.revoked && s.expires_utc > now)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.issued_utc.cmp(&a.issued_utc));
        Ok(out
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_active(&self) -> Result<i64, StoreError> {
        let sessions = self.sessions.lock().await;
        let now = Utc::now();
        Ok(sessions
            .values()
            .filter(|s| !s.revoked && s.expires_utc > now)
            .count() as i64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn policy(single_login: bool, max_sessions: u32) -> SessionPolicy {
        SessionPolicy {
            single_login,
            max_sessions,
        }
    }

    fn session_for(principal_id: Uuid, token: &str, issued_offset_secs: i64) -> RefreshSession {
        let now = Utc::now() + Duration::seconds(issued_offset_secs);
        RefreshSession {
            session_id: Uuid::new_v4(),
            token: token.to_string(),
            principal_id,
            username: "alice".to_string(),
            device: String::new(),
            client_ip: String::new(),
            issued_utc: now,
            expires_utc: now + Duration::days(7),
            last_used_utc: now,
            revoked: false,
            revoked_utc: None,
            revoked_reason: None,
        }
    }

    #[test]
    fn eviction_count_converges_over_limit_backlog() {
        let p = policy(false, 2);
        assert_eq!(eviction_count(0, &p), 0);
        assert_eq!(eviction_count(1, &p), 0);
        assert_eq!(eviction_count(2, &p), 1);
        // Backlog of 5 is trimmed so 2 remain after the insert.
        assert_eq!(eviction_count(5, &p), 4);
    }

    #[test]
    fn eviction_count_single_login_takes_all() {
        let p = policy(true, 0);
        assert_eq!(eviction_count(3, &p), 3);
    }

    #[test]
    fn eviction_count_unlimited() {
        let p = policy(false, 0);
        assert_eq!(eviction_count(10, &p), 0);
    }

    #[tokio::test]
    async fn single_login_evicts_previous() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        let p = policy(true, 0);

        let first = session_for(principal, "t1", 0);
        assert!(store.insert_with_policy(&first, &p).await.unwrap().is_empty());

        let second = session_for(principal, "t2", 1);
        let evicted = store.insert_with_policy(&second, &p).await.unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].session_id, first.session_id);
        assert_eq!(evicted[0].revoked_reason.as_deref(), Some("single_login"));

        let active = store.active_for_principal(principal).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, second.session_id);
    }

    #[tokio::test]
    async fn max_sessions_evicts_oldest() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        let p = policy(false, 2);

        let s1 = session_for(principal, "t1", 0);
        let s2 = session_for(principal, "t2", 1);
        let s3 = session_for(principal, "t3", 2);

        store.insert_with_policy(&s1, &p).await.unwrap();
        store.insert_with_policy(&s2, &p).await.unwrap();
        let evicted = store.insert_with_policy(&s3, &p).await.unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].session_id, s1.session_id);
        assert_eq!(evicted[0].revoked_reason.as_deref(), Some("max_sessions"));
        assert_eq!(store.count_active().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_token_detected() {
        let store = MemorySessionStore::new();
        let p = policy(false, 0);
        let s1 = session_for(Uuid::new_v4(), "same", 0);
        let s2 = session_for(Uuid::new_v4(), "same", 1);

        store.insert_with_policy(&s1, &p).await.unwrap();
        assert!(matches!(
            store.insert_with_policy(&s2, &p).await,
            Err(StoreError::DuplicateToken)
        ));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemorySessionStore::new();
        let s = session_for(Uuid::new_v4(), "t1", 0);
        store
            .insert_with_policy(&s, &policy(false, 0))
            .await
            .unwrap();

        let first = store
            .revoke(s.session_id, RevokeReason::Kickout, Utc::now())
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .revoke(s.session_id, RevokeReason::Kickout, Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired() {
        let store = MemorySessionStore::new();
        let p = policy(false, 0);
        let mut old = session_for(Uuid::new_v4(), "old", 0);
        old.expires_utc = Utc::now() - Duration::days(10);
        let live = session_for(Uuid::new_v4(), "live", 0);

        store.insert_with_policy(&old, &p).await.unwrap();
        store.insert_with_policy(&live, &p).await.unwrap();

        let deleted = store
            .delete_expired_before(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find_by_id(live.session_id).await.unwrap().is_some());
        assert!(store.find_by_id(old.session_id).await.unwrap().is_none());
    }
}
