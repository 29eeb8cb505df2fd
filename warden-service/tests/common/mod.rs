//! Shared harness for warden-service integration tests. Everything runs
//! against the in-memory backends, so tests need no external services.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use warden_core::middleware::create_ip_rate_limiter;
use warden_service::config::{
    AuthConfig, DatabaseConfig, Environment, RateLimitConfig, SessionPolicyConfig, StorageBackend,
    SweepConfig, WardenConfig,
};
use warden_service::models::{
    DataScope, DepartmentNode, LoginUser, MenuKind, MenuNode, Principal, PrincipalStatus,
    RoleGrant, SessionPolicy,
};
use warden_service::services::{
    AuthService, AuthorizationGate, DataScopeResolver, MemoryRevocationIndex, MemorySessionStore,
    PermissionResolver, SessionRegistry, StaticDirectory, TokenIssuer,
};
use warden_service::utils::hash_password;
use warden_service::{build_router, AppState};

pub const TEST_SECRET: &str = "dGVzdC1zZWNyZXQta2V5LXRlc3Qtc2VjcmV0LWtleS0hIQ==";

pub fn test_config() -> WardenConfig {
    WardenConfig {
        environment: Environment::Dev,
        service_name: "warden-service".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "error".to_string(),
        port: 8080,
        otlp_endpoint: None,
        backend: StorageBackend::Memory,
        database: DatabaseConfig {
            url: "postgres://localhost/warden".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        redis_url: None,
        auth: AuthConfig {
            token_secret: TEST_SECRET.to_string(),
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
            header_name: "Authorization".to_string(),
            header_prefix: "Bearer ".to_string(),
            super_admin_role: "admin".to_string(),
        },
        policy: SessionPolicyConfig {
            single_login: false,
            max_sessions: 0,
        },
        sweep: SweepConfig {
            interval_minutes: 1440,
            retention_days: 7,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: Arc<StaticDirectory>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_policy(single_login: bool, max_sessions: u32) -> Self {
        let mut config = test_config();
        config.policy.single_login = single_login;
        config.policy.max_sessions = max_sessions;
        Self::with_config(config)
    }

    pub fn with_config(config: WardenConfig) -> Self {
        let directory = Arc::new(StaticDirectory::new());
        let store = Arc::new(MemorySessionStore::new());
        let revocations = Arc::new(MemoryRevocationIndex::new());

        let issuer = TokenIssuer::new(&config.auth.token_secret, config.auth.access_ttl_minutes)
            .expect("issuer");
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

        let state = AppState {
            config: Arc::new(config),
            directory: directory.clone(),
            revocations,
            registry,
            permissions,
            scopes,
            gate,
            auth,
            login_rate_limiter,
            pool: None,
        };

        Self {
            router: build_router(state.clone()),
            state,
            directory,
        }
    }

    /// Seed an active user with a hashed password. Returns the principal id.
    pub fn seed_user(&self, username: &str, password: &str, roles: &[&str]) -> Uuid {
        self.seed_user_full(username, password, PrincipalStatus::Active, roles, None)
    }

    pub fn seed_user_full(
        &self,
        username: &str,
        password: &str,
        status: PrincipalStatus,
        roles: &[&str],
        dept_id: Option<i64>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.directory.add_user(LoginUser {
            principal: Principal {
                id,
                username: username.to_string(),
                display_name: username.to_string(),
                status,
                roles: roles.iter().map(|s| s.to_string()).collect(),
                dept_id,
            },
            password_hash: hash_password(password).expect("hash"),
        });
        id
    }

    pub fn seed_grant(
        &self,
        role: &str,
        scope: DataScope,
        custom_dept_ids: &[i64],
        permissions: &[&str],
    ) {
        self.directory.add_grant(RoleGrant {
            role_code: role.to_string(),
            data_scope: scope,
            custom_dept_ids: custom_dept_ids.to_vec(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        });
    }

    pub fn seed_menu(
        &self,
        menu_id: i64,
        parent_id: i64,
        label: &str,
        order_num: i32,
        kind: MenuKind,
        perm_code: Option<&str>,
        roles: &[&str],
    ) {
        self.directory.add_menu(
            MenuNode {
                menu_id,
                parent_id,
                label: label.to_string(),
                order_num,
                kind,
                perm_code: perm_code.map(|s| s.to_string()),
            },
            roles,
        );
    }

    pub fn seed_department(&self, dept_id: i64, parent_id: i64, ancestors: &str) {
        self.directory.add_department(DepartmentNode {
            dept_id,
            parent_id,
            ancestors: ancestors.to_string(),
        });
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.request(req).await
    }

    pub async fn post_json_auth(
        &self,
        path: &str,
        token: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body.to_string()))
            .expect("request");
        self.request(req).await
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .expect("request");
        self.request(req).await
    }

    pub async fn delete_auth(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("DELETE")
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .expect("request");
        self.request(req).await
    }

    /// Log a user in and return (access_token, refresh_token).
    pub async fn login(&self, username: &str, password: &str) -> (String, String) {
        let (status, body) = self
            .post_json(
                "/auth/login",
                json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        (
            body["access_token"].as_str().expect("access_token").to_string(),
            body["refresh_token"]
                .as_str()
                .expect("refresh_token")
                .to_string(),
        )
    }
}

pub fn error_code(body: &Value) -> &str {
    body["code"].as_str().unwrap_or("")
}
