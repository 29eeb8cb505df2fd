//! Directory read model: the engine's window onto principals, role grants,
//! menus and the department hierarchy. The directory is owned by the
//! surrounding administration platform; everything here is read-only.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;
use warden_core::retry::{retry_async, RetryConfig};

use crate::models::{
    DepartmentNode, LoginUser, MenuKind, MenuNode, Principal, PrincipalStatus, RoleGrant,
};
use crate::services::error::ServiceError;

#[derive(Debug, Error)]
#[error("directory error: {0}")]
pub struct DirectoryError(#[from] pub anyhow::Error);

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        DirectoryError(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_login_user(&self, username: &str) -> Result<Option<LoginUser>, DirectoryError>;
    async fn load_principal(&self, principal_id: Uuid)
        -> Result<Option<Principal>, DirectoryError>;
    async fn role_grants(&self, role_codes: &[String]) -> Result<Vec<RoleGrant>, DirectoryError>;
    async fn menu_nodes_for_roles(
        &self,
        role_codes: &[String],
    ) -> Result<Vec<MenuNode>, DirectoryError>;
    /// Ids of departments whose ancestor chain contains `dept_id`, the node
    /// itself excluded.
    async fn descendant_departments(&self, dept_id: i64) -> Result<Vec<i64>, DirectoryError>;
}

/// Run a directory read with bounded retries; a read that keeps failing is
/// reported as `DirectoryUnavailable`, never as a denial.
pub async fn directory_read<T, F, Fut>(
    retry: &RetryConfig,
    operation: &str,
    f: F,
) -> Result<T, ServiceError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, DirectoryError>>,
{
    retry_async(retry, operation, |_: &DirectoryError| true, f)
        .await
        .map_err(|e| {
            tracing::error!(operation, error = %e, "directory read failed");
            ServiceError::DirectoryUnavailable
        })
}

// ==================== Postgres implementation ====================

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn roles_of(&self, principal_id: Uuid) -> Result<Vec<String>, DirectoryError> {
        let rows = sqlx::query(
            "SELECT role_code FROM principal_roles WHERE principal_id = $1 ORDER BY role_code",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("role_code")).collect())
    }

    async fn principal_from_row(
        &self,
        row: &sqlx::postgres::PgRow,
    ) -> Result<Principal, DirectoryError> {
        let id: Uuid = row.get("principal_id");
        Ok(Principal {
            id,
            username: row.get("username"),
            display_name: row.get("display_name"),
            status: PrincipalStatus::from_i16(row.get("status")),
            roles: self.roles_of(id).await?,
            dept_id: row.get("dept_id"),
        })
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn find_login_user(&self, username: &str) -> Result<Option<LoginUser>, DirectoryError> {
        let row = sqlx::query(
            "SELECT principal_id, username, display_name, password_hash, status, dept_id
             FROM principals WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let password_hash: String = row.get("password_hash");
        let principal = self.principal_from_row(&row).await?;
        Ok(Some(LoginUser {
            principal,
            password_hash,
        }))
    }

    async fn load_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<Principal>, DirectoryError> {
        let row = sqlx::query(
            "SELECT principal_id, username, display_name, status, dept_id
             FROM principals WHERE principal_id = $1",
        )
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.principal_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn role_grants(&self, role_codes: &[String]) -> Result<Vec<RoleGrant>, DirectoryError> {
        if role_codes.is_empty() {
            return Ok(Vec::new());
        }

        let role_rows =
            sqlx::query("SELECT role_code, data_scope FROM roles WHERE role_code = ANY($1)")
                .bind(role_codes)
                .fetch_all(&self.pool)
                .await?;

        let mut grants: HashMap<String, RoleGrant> = role_rows
            .iter()
            .map(|r| {
                let code: String = r.get("role_code");
                (
                    code.clone(),
                    RoleGrant {
                        role_code: code,
                        data_scope: crate::models::DataScope::from_i16(r.get("data_scope")),
                        custom_dept_ids: Vec::new(),
                        permissions: Vec::new(),
                    },
                )
            })
            .collect();

        let perm_rows = sqlx::query(
            "SELECT role_code, perm_code FROM role_permissions WHERE role_code = ANY($1)",
        )
        .bind(role_codes)
        .fetch_all(&self.pool)
        .await?;
        for r in &perm_rows {
            let code: String = r.get("role_code");
            if let Some(grant) = grants.get_mut(&code) {
                grant.permissions.push(r.get("perm_code"));
            }
        }

        let dept_rows =
            sqlx::query("SELECT role_code, dept_id FROM role_depts WHERE role_code = ANY($1)")
                .bind(role_codes)
                .fetch_all(&self.pool)
                .await?;
        for r in &dept_rows {
            let code: String = r.get("role_code");
            if let Some(grant) = grants.get_mut(&code) {
                grant.custom_dept_ids.push(r.get("dept_id"));
            }
        }

        let mut out: Vec<RoleGrant> = grants.into_values().collect();
        out.sort_by(|a, b| a.role_code.cmp(&b.role_code));
        Ok(out)
    }

    async fn menu_nodes_for_roles(
        &self,
        role_codes: &[String],
    ) -> Result<Vec<MenuNode>, DirectoryError> {
        if role_codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT DISTINCT m.menu_id, m.parent_id, m.label, m.order_num, m.kind, m.perm_code
             FROM menus m
             JOIN role_menus rm ON rm.menu_id = m.menu_id
             WHERE rm.role_code = ANY($1)
             ORDER BY m.menu_id",
        )
        .bind(role_codes)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| MenuNode {
                menu_id: r.get("menu_id"),
                parent_id: r.get("parent_id"),
                label: r.get("label"),
                order_num: r.get("order_num"),
                kind: MenuKind::from_i16(r.get("kind")),
                perm_code: r.get("perm_code"),
            })
            .collect())
    }

    async fn descendant_departments(&self, dept_id: i64) -> Result<Vec<i64>, DirectoryError> {
        let rows = sqlx::query(
            "SELECT dept_id FROM departments
             WHERE string_to_array(NULLIF(ancestors, ''), ',')::bigint[] @> ARRAY[$1]
             ORDER BY dept_id",
        )
        .bind(dept_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("dept_id")).collect())
    }
}

// ==================== In-memory fixture ====================

/// In-memory directory for tests and single-node use. A fault toggle makes
/// outage behavior testable.
#[derive(Default)]
pub struct StaticDirectory {
    inner: RwLock<Inner>,
    failing: AtomicBool,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, LoginUser>,
    grants: HashMap<String, RoleGrant>,
    menus: HashMap<i64, MenuNode>,
    role_menus: HashMap<String, Vec<i64>>,
    departments: HashMap<i64, DepartmentNode>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: LoginUser) {
        let mut inner = self.inner.write().expect("directory lock");
        inner.users.insert(user.principal.username.clone(), user);
    }

    pub fn add_grant(&self, grant: RoleGrant) {
        let mut inner = self.inner.write().expect("directory lock");
        inner.grants.insert(grant.role_code.clone(), grant);
    }

    pub fn add_menu(&self, menu: MenuNode, role_codes: &[&str]) {
        let mut inner = self.inner.write().expect("directory lock");
        for code in role_codes {
            inner
                .role_menus
                .entry(code.to_string())
                .or_default()
                .push(menu.menu_id);
        }
        inner.menus.insert(menu.menu_id, menu);
    }

    pub fn add_department(&self, dept: DepartmentNode) {
        let mut inner = self.inner.write().expect("directory lock");
        inner.departments.insert(dept.dept_id, dept);
    }

    /// Toggle simulated outage: every read fails while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DirectoryError(anyhow::anyhow!("directory unavailable")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_login_user(&self, username: &str) -> Result<Option<LoginUser>, DirectoryError> {
        self.check_available()?;
        let inner = self.inner.read().expect("directory lock");
        Ok(inner.users.get(username).cloned())
    }

    async fn load_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Option<Principal>, DirectoryError> {
        self.check_available()?;
        let inner = self.inner.read().expect("directory lock");
        Ok(inner
            .users
            .values()
            .find(|u| u.principal.id == principal_id)
            .map(|u| u.principal.clone()))
    }

    async fn role_grants(&self, role_codes: &[String]) -> Result<Vec<RoleGrant>, DirectoryError> {
        self.check_available()?;
        let inner = self.inner.read().expect("directory lock");
        let mut out: Vec<RoleGrant> = role_codes
            .iter()
            .filter_map(|code| inner.grants.get(code).cloned())
            .collect();
        out.sort_by(|a, b| a.role_code.cmp(&b.role_code));
        Ok(out)
    }

    async fn menu_nodes_for_roles(
        &self,
        role_codes: &[String],
    ) -> Result<Vec<MenuNode>, DirectoryError> {
        self.check_available()?;
        let inner = self.inner.read().expect("directory lock");
        let mut ids: Vec<i64> = role_codes
            .iter()
            .filter_map(|code| inner.role_menus.get(code))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| inner.menus.get(id).cloned())
            .collect())
    }

    async fn descendant_departments(&self, dept_id: i64) -> Result<Vec<i64>, DirectoryError> {
        self.check_available()?;
        let inner = self.inner.read().expect("directory lock");
        let mut out: Vec<i64> = inner
            .departments
            .values()
            .filter(|d| d.has_ancestor(dept_id))
            .map(|d| d.dept_id)
            .collect();
        out.sort_unstable();
        Ok(out)
    }
}
