//! Data-scope resolution: from a principal's role grants to a concrete
//! decision about which department rows they may see, plus SQL predicate
//! rendering for row-level filters.

use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;
use warden_core::retry::RetryConfig;

use crate::models::{DataScope, Principal};
use crate::services::directory::{directory_read, Directory};
use crate::services::error::ServiceError;

/// Resolved visibility for one principal: the winning scope and, for the
/// department-bounded scopes, the concrete department id set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDecision {
    pub scope: DataScope,
    pub dept_ids: BTreeSet<i64>,
}

impl ScopeDecision {
    pub fn all() -> Self {
        Self {
            scope: DataScope::All,
            dept_ids: BTreeSet::new(),
        }
    }

    pub fn self_only() -> Self {
        Self {
            scope: DataScope::SelfOnly,
            dept_ids: BTreeSet::new(),
        }
    }

    /// Whether a row tagged with the given department is visible. A row with
    /// no department is visible only under `All`; self-owned rows are the
    /// caller's short-circuit, not this check.
    pub fn permits_dept(&self, dept_id: Option<i64>) -> bool {
        match self.scope {
            DataScope::All => true,
            DataScope::SelfOnly => false,
            _ => match dept_id {
                Some(id) => self.dept_ids.contains(&id),
                None => false,
            },
        }
    }
}

/// Row filter for embedding in WHERE clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPredicate {
    Unrestricted,
    DeptEq { column: String, dept_id: i64 },
    DeptIn { column: String, dept_ids: Vec<i64> },
    CreatorEq { column: String, principal_id: Uuid },
    MatchNone,
}

impl QueryPredicate {
    pub fn as_sql(&self) -> String {
        match self {
            QueryPredicate::Unrestricted => "1 = 1".to_string(),
            QueryPredicate::DeptEq { column, dept_id } => format!("{} = {}", column, dept_id),
            QueryPredicate::DeptIn { column, dept_ids } => {
                let ids: Vec<String> = dept_ids.iter().map(|id| id.to_string()).collect();
                format!("{} IN ({})", column, ids.join(", "))
            }
            QueryPredicate::CreatorEq {
                column,
                principal_id,
            } => format!("{} = '{}'", column, principal_id),
            QueryPredicate::MatchNone => "1 = 0".to_string(),
        }
    }
}

pub struct DataScopeResolver {
    directory: Arc<dyn Directory>,
    super_admin_role: String,
    retry: RetryConfig,
}

impl DataScopeResolver {
    pub fn new(directory: Arc<dyn Directory>, super_admin_role: String) -> Self {
        Self {
            directory,
            super_admin_role,
            retry: RetryConfig::quick(),
        }
    }

    fn is_super_admin(&self, principal: &Principal) -> bool {
        principal.roles.iter().any(|r| *r == self.super_admin_role)
    }

    /// Resolve the strongest scope across the principal's roles and expand it
    /// to a department id set. Principals with no grants, and any directory
    /// failure along the way, fall closed to `SelfOnly`.
    pub async fn resolve(&self, principal: &Principal) -> Result<ScopeDecision, ServiceError> {
        if self.is_super_admin(principal) {
            return Ok(ScopeDecision::all());
        }
        if principal.roles.is_empty() {
            return Ok(ScopeDecision::self_only());
        }

        let grants = match directory_read(&self.retry, "role_grants", || {
            self.directory.role_grants(&principal.roles)
        })
        .await
        {
            Ok(grants) => grants,
            Err(_) => return Ok(self.degraded(principal)),
        };

        let Some(strongest) = grants.iter().map(|g| g.data_scope).max_by_key(|s| s.rank()) else {
            return Ok(ScopeDecision::self_only());
        };

        match strongest {
            DataScope::All => Ok(ScopeDecision::all()),
            DataScope::SelfOnly => Ok(ScopeDecision::self_only()),
            DataScope::Custom => {
                let dept_ids: BTreeSet<i64> = grants
                    .iter()
                    .filter(|g| g.data_scope == DataScope::Custom)
                    .flat_map(|g| g.custom_dept_ids.iter().copied())
                    .collect();
                Ok(ScopeDecision {
                    scope: DataScope::Custom,
                    dept_ids,
                })
            }
            DataScope::Dept => {
                let dept_ids = match self.own_dept(principal).await {
                    Ok(Some(id)) => BTreeSet::from([id]),
                    // No department: visible to nothing, not everything.
                    Ok(None) => BTreeSet::new(),
                    Err(_) => return Ok(self.degraded(principal)),
                };
                Ok(ScopeDecision {
                    scope: DataScope::Dept,
                    dept_ids,
                })
            }
            DataScope::DeptAndChild => {
                let own = match self.own_dept(principal).await {
                    Ok(Some(id)) => id,
                    Ok(None) => {
                        return Ok(ScopeDecision {
                            scope: DataScope::DeptAndChild,
                            dept_ids: BTreeSet::new(),
                        });
                    }
                    Err(_) => return Ok(self.degraded(principal)),
                };
                let mut dept_ids = BTreeSet::from([own]);
                match directory_read(&self.retry, "descendant_departments", || {
                    self.directory.descendant_departments(own)
                })
                .await
                {
                    Ok(descendants) => dept_ids.extend(descendants),
                    // Partial hierarchy must not leak rows.
                    Err(_) => return Ok(self.degraded(principal)),
                }
                Ok(ScopeDecision {
                    scope: DataScope::DeptAndChild,
                    dept_ids,
                })
            }
        }
    }

    /// Render a predicate from a decision. `SelfOnly` filters on the creator
    /// column; an empty department set matches nothing.
    pub fn predicate(
        &self,
        decision: &ScopeDecision,
        principal: &Principal,
        dept_column: &str,
        creator_column: &str,
    ) -> QueryPredicate {
        match decision.scope {
            DataScope::All => QueryPredicate::Unrestricted,
            DataScope::SelfOnly => QueryPredicate::CreatorEq {
                column: creator_column.to_string(),
                principal_id: principal.id,
            },
            _ => {
                let mut ids: Vec<i64> = decision.dept_ids.iter().copied().collect();
                match ids.len() {
                    0 => QueryPredicate::MatchNone,
                    1 => QueryPredicate::DeptEq {
                        column: dept_column.to_string(),
                        dept_id: ids.remove(0),
                    },
                    _ => QueryPredicate::DeptIn {
                        column: dept_column.to_string(),
                        dept_ids: ids,
                    },
                }
            }
        }
    }

    /// The principal's department. Claims-rehydrated principals carry no
    /// department, so fall back to a directory lookup.
    async fn own_dept(&self, principal: &Principal) -> Result<Option<i64>, ServiceError> {
        if principal.dept_id.is_some() {
            return Ok(principal.dept_id);
        }
        let loaded = directory_read(&self.retry, "load_principal", || {
            self.directory.load_principal(principal.id)
        })
        .await?;
        Ok(loaded.and_then(|p| p.dept_id))
    }

    /// Directory failure during resolution falls closed to `SelfOnly`.
    fn degraded(&self, principal: &Principal) -> ScopeDecision {
        tracing::warn!(
            principal_id = %principal.id,
            "data scope resolution failed, falling back to self-only"
        );
        ScopeDecision::self_only()
    }
}
