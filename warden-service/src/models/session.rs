//! Refresh session model - server-tracked sessions behind opaque tokens.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh session entity, one row per login.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub token: String,
    pub principal_id: Uuid,
    pub username: String,
    pub device: String,
    pub client_ip: String,
    pub issued_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub last_used_utc: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
}

impl RefreshSession {
    /// Check if session can still mint access credentials.
    pub fn is_valid(&self) -> bool {
        !self.revoked && self.expires_utc > Utc::now()
    }

    /// Check if session is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_utc <= Utc::now()
    }

    /// Seconds until natural expiry; zero once expired.
    pub fn remaining_ttl_seconds(&self) -> i64 {
        (self.expires_utc - Utc::now()).num_seconds().max(0)
    }
}

/// Why a session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    Logout,
    Kickout,
    SingleLogin,
    MaxSessions,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Logout => "logout",
            RevokeReason::Kickout => "kickout",
            RevokeReason::SingleLogin => "single_login",
            RevokeReason::MaxSessions => "max_sessions",
        }
    }
}

/// Session creation policy applied atomically with the insert.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub single_login: bool,
    /// 0 means unlimited.
    pub max_sessions: u32,
}

/// Session info for API responses. The token value is never serialized.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub principal_id: Uuid,
    pub username: String,
    pub device: String,
    pub client_ip: String,
    pub issued_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub last_used_utc: DateTime<Utc>,
}

impl From<&RefreshSession> for SessionInfo {
    fn from(s: &RefreshSession) -> Self {
        Self {
            session_id: s.session_id,
            principal_id: s.principal_id,
            username: s.username.clone(),
            device: s.device.clone(),
            client_ip: s.client_ip.clone(),
            issued_utc: s.issued_utc,
            expires_utc: s.expires_utc,
            last_used_utc: s.last_used_utc,
        }
    }
}
