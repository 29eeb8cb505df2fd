use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

use warden_core::error::AppError;
use warden_core::middleware::create_ip_rate_limiter;
use warden_core::observability::logging::init_tracing;

use warden_service::config::{StorageBackend, WardenConfig};
use warden_service::models::SessionPolicy;
use warden_service::services::{
    metrics, spawn_sweeper, AuthService, AuthorizationGate, DataScopeResolver, Directory,
    MemoryRevocationIndex, MemorySessionStore, PermissionResolver, PgDirectory, PgSessionStore,
    RedisRevocationIndex, RevocationIndex, SessionRegistry, SessionStore, TokenIssuer,
};
use warden_service::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on bad configuration.
    let config = WardenConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        backend = ?config.backend,
        "Starting authorization engine"
    );

    let mut pool = None;
    let (store, directory): (Arc<dyn SessionStore>, Arc<dyn Directory>) = match config.backend {
        StorageBackend::Postgres => {
            let pg = warden_service::db::create_pool(&config.database).await?;
            warden_service::db::run_migrations(&pg)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            tracing::info!("Database initialized");
            pool = Some(pg.clone());
            (
                Arc::new(PgSessionStore::new(pg.clone())),
                Arc::new(PgDirectory::new(pg)),
            )
        }
        StorageBackend::Memory => {
            tracing::info!("Using in-memory session store and directory");
            (
                Arc::new(MemorySessionStore::new()),
                Arc::new(warden_service::services::StaticDirectory::new()),
            )
        }
    };

    let revocations: Arc<dyn RevocationIndex> = match &config.redis_url {
        Some(url) => Arc::new(RedisRevocationIndex::new(url).await.map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Redis connection failed: {}", e))
        })?),
        None => {
            tracing::info!("Using in-memory revocation index");
            Arc::new(MemoryRevocationIndex::new())
        }
    };

    let issuer = TokenIssuer::new(&config.auth.token_secret, config.auth.access_ttl_minutes)
        .map_err(AppError::ConfigError)?;

    let policy = SessionPolicy {
        single_login: config.policy.single_login,
        max_sessions: config.policy.max_sessions,
    };
    let registry = Arc::new(SessionRegistry::new(
        store,
        directory.clone(),
        issuer.clone(),
        revocations.clone(),
        policy,
        config.auth.refresh_ttl_days,
    ));
    spawn_sweeper(
        registry.clone(),
        config.sweep.interval_minutes,
        config.sweep.retention_days,
    );

    let permissions = Arc::new(PermissionResolver::new(
        directory.clone(),
        config.auth.super_admin_role.clone(),
    ));
    let scopes = Arc::new(DataScopeResolver::new(
        directory.clone(),
        config.auth.super_admin_role.clone(),
    ));
    let gate = Arc::new(AuthorizationGate::new(
        issuer.clone(),
        revocations.clone(),
        permissions.clone(),
        scopes.clone(),
    ));
    let auth = Arc::new(AuthService::new(
        directory.clone(),
        issuer,
        registry.clone(),
        gate.clone(),
    ));

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        directory,
        revocations,
        registry,
        permissions,
        scopes,
        gate,
        auth,
        login_rate_limiter,
        pool,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
