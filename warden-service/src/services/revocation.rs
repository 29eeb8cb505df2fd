//! Revocation index: expiring keys that shadow credentials revoked before
//! their natural expiry. Keys are SHA-256 digests of access credentials or
//! raw refresh-token values; entries carry the artifact's remaining TTL so
//! the index never outgrows the set of live credentials.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use redis::{aio::ConnectionManager, Client};
use sha2::{Digest, Sha256};

/// Past this many live entries the memory index sweeps dead ones on insert.
const SWEEP_THRESHOLD: usize = 1024;

/// Key for an access credential: its SHA-256 hex digest. Refresh tokens are
/// indexed by raw value (already opaque and fixed-length).
pub fn credential_key(raw: &str) -> String {
    use std::fmt::Write;
    let digest = Sha256::digest(raw.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

#[async_trait]
pub trait RevocationIndex: Send + Sync {
    /// Record a revoked key for `ttl_seconds`. A non-positive TTL means the
    /// artifact is already expired and nothing is written.
    async fn revoke(&self, key: &str, ttl_seconds: i64, reason: &str) -> Result<(), anyhow::Error>;

    async fn is_revoked(&self, key: &str) -> Result<bool, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

// ==================== Redis implementation ====================

#[derive(Clone)]
pub struct RedisRevocationIndex {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisRevocationIndex {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects automatically.
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    fn key(key: &str) -> String {
        format!("revoked:{}", key)
    }
}

#[async_trait]
impl RevocationIndex for RedisRevocationIndex {
    async fn revoke(&self, key: &str, ttl_seconds: i64, reason: &str) -> Result<(), anyhow::Error> {
        if ttl_seconds <= 0 {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(Self::key(key))
            .arg(reason)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write revocation entry: {}", e))
    }

    async fn is_revoked(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check revocation entry: {}", e))?;
        Ok(exists)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

// ==================== In-memory implementation ====================

/// Expiring map for single-process deployments and tests. Lookups ignore and
/// evict dead entries; a full sweep runs lazily once the map grows past
/// [`SWEEP_THRESHOLD`].
#[derive(Default)]
pub struct MemoryRevocationIndex {
    entries: DashMap<String, DateTime<Utc>>,
}

impl MemoryRevocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl RevocationIndex for MemoryRevocationIndex {
    async fn revoke(
        &self,
        key: &str,
        ttl_seconds: i64,
        _reason: &str,
    ) -> Result<(), anyhow::Error> {
        if ttl_seconds <= 0 {
            return Ok(());
        }

        let expiry = Utc::now() + Duration::seconds(ttl_seconds);
        self.entries.insert(key.to_string(), expiry);

        if self.entries.len() > SWEEP_THRESHOLD {
            let now = Utc::now();
            self.entries.retain(|_, exp| *exp > now);
        }

        Ok(())
    }

    async fn is_revoked(&self, key: &str) -> Result<bool, anyhow::Error> {
        let now = Utc::now();
        match self.entries.get(key).map(|e| *e.value()) {
            Some(expiry) if expiry > now => Ok(true),
            Some(_) => {
                self.entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
