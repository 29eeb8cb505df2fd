use base64::{engine::general_purpose::STANDARD, Engine};
use std::env;
use warden_core::error::AppError;

// Dev-only fallback; `validate()` rejects it in production.
const DEV_TOKEN_SECRET: &str = "d2FyZGVuLWRldi1zaWduaW5nLWtleS0zMi1ieXRlcyE=";

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub otlp_endpoint: Option<String>,
    pub backend: StorageBackend,
    pub database: DatabaseConfig,
    pub redis_url: Option<String>,
    pub auth: AuthConfig,
    pub policy: SessionPolicyConfig,
    pub sweep: SweepConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

/// Where refresh sessions live. `Memory` is the single-node option and the
/// test default; `Postgres` is the production choice.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base64-encoded HMAC signing key; must decode to at least 32 bytes.
    pub token_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    /// Header carrying the access credential and the expected value prefix.
    pub header_name: String,
    pub header_prefix: String,
    /// Role code that bypasses all permission checks.
    pub super_admin_role: String,
}

#[derive(Debug, Clone)]
pub struct SessionPolicyConfig {
    pub single_login: bool,
    /// 0 means unlimited.
    pub max_sessions: u32,
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval_minutes: u64,
    /// Expired rows are kept this long before the sweeper deletes them.
    pub retention_days: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

impl WardenConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = WardenConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("warden-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("8080"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            backend: get_env("STORAGE_BACKEND", Some("postgres"), is_prod)?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/warden"),
                    is_prod,
                )?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            auth: AuthConfig {
                token_secret: get_env("TOKEN_SECRET", Some(DEV_TOKEN_SECRET), is_prod)?,
                access_ttl_minutes: parse_env("ACCESS_TTL_MINUTES", Some("30"), is_prod)?,
                refresh_ttl_days: parse_env("REFRESH_TTL_DAYS", Some("7"), is_prod)?,
                header_name: get_env("AUTH_HEADER_NAME", Some("Authorization"), is_prod)?,
                header_prefix: get_env("AUTH_HEADER_PREFIX", Some("Bearer "), is_prod)?,
                super_admin_role: get_env("SUPER_ADMIN_ROLE", Some("admin"), is_prod)?,
            },
            policy: SessionPolicyConfig {
                single_login: parse_env("SESSION_SINGLE_LOGIN", Some("false"), is_prod)?,
                max_sessions: parse_env("SESSION_MAX_SESSIONS", Some("0"), is_prod)?,
            },
            sweep: SweepConfig {
                interval_minutes: parse_env("SWEEP_INTERVAL_MINUTES", Some("1440"), is_prod)?,
                retention_days: parse_env("SWEEP_RETENTION_DAYS", Some("7"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        let key = STANDARD.decode(&self.auth.token_secret).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("TOKEN_SECRET is not valid base64: {}", e))
        })?;
        if key.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_SECRET must decode to at least 32 bytes, got {}",
                key.len()
            )));
        }

        if self.auth.access_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TTL_MINUTES must be positive"
            )));
        }

        if self.auth.refresh_ttl_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TTL_DAYS must be positive"
            )));
        }

        if self.sweep.retention_days < 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SWEEP_RETENTION_DAYS must not be negative"
            )));
        }

        if self.environment == Environment::Prod {
            if self.auth.token_secret == DEV_TOKEN_SECRET {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "TOKEN_SECRET must be set explicitly in production"
                )));
            }
            if self.backend == StorageBackend::Memory {
                tracing::warn!(
                    "memory session backend in production: sessions will not survive restarts"
                );
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}
