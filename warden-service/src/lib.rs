pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::WardenConfig;
use crate::middleware::{auth_middleware, require_permissions, track_metrics, PermissionPolicy};
use crate::services::{
    AuthService, AuthorizationGate, DataScopeResolver, Directory, PermissionResolver,
    RevocationIndex, SessionRegistry,
};
use warden_core::middleware::{
    ip_rate_limit_middleware, request_id_middleware, security_headers_middleware, IpRateLimiter,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WardenConfig>,
    pub directory: Arc<dyn Directory>,
    pub revocations: Arc<dyn RevocationIndex>,
    pub registry: Arc<SessionRegistry>,
    pub permissions: Arc<PermissionResolver>,
    pub scopes: Arc<DataScopeResolver>,
    pub gate: Arc<AuthorizationGate>,
    pub auth: Arc<AuthService>,
    pub login_rate_limiter: IpRateLimiter,
    pub pool: Option<PgPool>,
}

pub fn build_router(state: AppState) -> Router {
    // Login gets its own per-IP budget.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let public_routes = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .merge(login_route);

    let permission_layer = |code: &str| {
        from_fn_with_state(
            (state.clone(), PermissionPolicy::require(code)),
            require_permissions,
        )
    };

    // Session monitor routes; /users/:id/sessions carries a different
    // permission per method.
    let monitor_routes = Router::new()
        .route(
            "/sessions",
            get(handlers::sessions::list_sessions)
                .route_layer(permission_layer("monitor:session:list")),
        )
        .route(
            "/sessions/:id",
            delete(handlers::sessions::kick_session)
                .route_layer(permission_layer("monitor:session:kick")),
        )
        .route(
            "/users/:id/sessions",
            get(handlers::sessions::user_sessions)
                .route_layer(permission_layer("monitor:session:list"))
                .merge(
                    delete(handlers::sessions::kick_user_sessions)
                        .route_layer(permission_layer("monitor:session:kick")),
                ),
        );

    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users/me/permissions", get(handlers::me::my_permissions))
        .route("/users/me/menus", get(handlers::me::my_menus))
        .merge(monitor_routes)
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    // Layers run outermost-last: request id first, then security headers,
    // tracing, metrics.
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
