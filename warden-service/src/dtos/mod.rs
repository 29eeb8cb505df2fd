use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

use crate::models::{DataScope, MenuTreeNode, SessionInfo};
use crate::services::ScopeDecision;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// The caller's effective permission codes and data scope.
#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub username: String,
    pub roles: Vec<String>,
    pub permissions: BTreeSet<String>,
    pub data_scope: DataScopeView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataScopeView {
    pub scope: DataScope,
    pub dept_ids: BTreeSet<i64>,
}

impl From<ScopeDecision> for DataScopeView {
    fn from(decision: ScopeDecision) -> Self {
        Self {
            scope: decision.scope,
            dept_ids: decision.dept_ids,
        }
    }
}

/// Navigational menu tree plus button codes grouped by owning menu.
#[derive(Debug, Serialize)]
pub struct MenusResponse {
    pub menus: Vec<MenuTreeNode>,
    pub buttons: BTreeMap<i64, BTreeSet<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SessionPageResponse {
    pub sessions: Vec<SessionInfo>,
    pub offset: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokedCountResponse {
    pub revoked: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
