//! Token issuer: HS256 access credentials and opaque refresh tokens.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Principal;
use crate::services::error::ServiceError;

const ACCESS_TOKEN_TYP: &str = "access";
const REFRESH_TOKEN_BYTES: usize = 32;

/// Mints and validates access credentials; mints opaque refresh tokens.
/// Stateless: revocation is enforced elsewhere.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_minutes: i64,
}

/// The signed claim set. Deliberately minimal: no `jti`, no session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (principal id)
    pub sub: Uuid,
    /// Username at mint time
    pub username: String,
    /// Role codes at mint time
    pub roles: Vec<String>,
    /// Token type, always "access"
    pub typ: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Token pair returned to the client on login and refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

impl TokenIssuer {
    /// Create a new issuer from a base64-encoded symmetric key. Keys shorter
    /// than 256 bits are rejected.
    pub fn new(token_secret: &str, access_ttl_minutes: i64) -> Result<Self, anyhow::Error> {
        let key = STANDARD
            .decode(token_secret)
            .map_err(|e| anyhow::anyhow!("Token secret is not valid base64: {}", e))?;

        if key.len() < 32 {
            return Err(anyhow::anyhow!(
                "Token secret must decode to at least 32 bytes, got {}",
                key.len()
            ));
        }

        tracing::info!("Token issuer initialized with HS256 key");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
            access_ttl_minutes,
        })
    }

    /// Mint a signed access credential for a principal.
    pub fn issue_access(&self, principal: &Principal) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_ttl_minutes);

        let claims = AccessClaims {
            sub: principal.id,
            username: principal.username.clone(),
            roles: principal.roles.clone(),
            typ: ACCESS_TOKEN_TYP.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Verify signature, expiry (zero leeway) and token type. Does not check
    /// revocation; callers needing that consult the revocation index.
    pub fn validate_access(&self, raw: &str) -> Result<AccessClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data =
            decode::<AccessClaims>(raw, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                    _ => ServiceError::TokenInvalid,
                }
            })?;

        if token_data.claims.typ != ACCESS_TOKEN_TYP {
            return Err(ServiceError::TokenInvalid);
        }

        Ok(token_data.claims)
    }

    /// Mint an opaque refresh token: 32 CSPRNG bytes, URL-safe base64 without
    /// padding. Uniqueness is guaranteed at the storage layer.
    pub fn issue_refresh(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Access credential lifetime in seconds (for client info).
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_minutes * 60
    }
}
