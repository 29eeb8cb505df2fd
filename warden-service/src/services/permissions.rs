//! Permission resolver: role-set closure of permission codes, menu tree
//! assembly, and the super-admin bypass.

use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use warden_core::retry::RetryConfig;

use crate::models::{MenuKind, MenuNode, MenuTreeNode, Principal};
use crate::services::directory::{directory_read, Directory};
use crate::services::error::ServiceError;

/// The permission set of a super-admin; matches every required code.
pub const WILDCARD_PERMISSION: &str = "*:*:*";

/// Multi-code check combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

pub struct PermissionResolver {
    directory: Arc<dyn Directory>,
    cache: DashMap<String, Arc<BTreeSet<String>>>,
    super_admin_role: String,
    retry: RetryConfig,
}

impl PermissionResolver {
    pub fn new(directory: Arc<dyn Directory>, super_admin_role: String) -> Self {
        Self {
            directory,
            cache: DashMap::new(),
            super_admin_role,
            retry: RetryConfig::quick(),
        }
    }

    pub fn is_super_admin(&self, principal: &Principal) -> bool {
        principal.roles.iter().any(|r| *r == self.super_admin_role)
    }

    /// Cache key: the sorted, comma-joined role-code set, so principals with
    /// identical roles share one entry.
    fn cache_key(role_codes: &[String]) -> String {
        let mut codes: Vec<&str> = role_codes.iter().map(String::as_str).collect();
        codes.sort_unstable();
        codes.dedup();
        codes.join(",")
    }

    /// The closure of permission codes granted to the principal's roles.
    /// The super-admin bypass runs before the cache or directory is touched.
    pub async fn permissions_for(
        &self,
        principal: &Principal,
    ) -> Result<Arc<BTreeSet<String>>, ServiceError> {
        if self.is_super_admin(principal) {
            let mut set = BTreeSet::new();
            set.insert(WILDCARD_PERMISSION.to_string());
            return Ok(Arc::new(set));
        }

        if principal.roles.is_empty() {
            return Ok(Arc::new(BTreeSet::new()));
        }

        let key = Self::cache_key(&principal.roles);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let grants = directory_read(&self.retry, "role_grants", || {
            self.directory.role_grants(&principal.roles)
        })
        .await?;

        let permissions: BTreeSet<String> = grants
            .into_iter()
            .flat_map(|g| g.permissions)
            .filter(|p| !p.is_empty())
            .collect();

        let permissions = Arc::new(permissions);
        self.cache.insert(key, permissions.clone());
        Ok(permissions)
    }

    /// Single-code check. An empty required code is never granted.
    pub async fn has_permission(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<bool, ServiceError> {
        if code.is_empty() {
            return Ok(false);
        }
        let permissions = self.permissions_for(principal).await?;
        Ok(permissions.contains(WILDCARD_PERMISSION) || permissions.contains(code))
    }

    /// Multi-code check with And/Or logic. An empty code list denies.
    pub async fn check(
        &self,
        principal: &Principal,
        codes: &[&str],
        logical: Logical,
    ) -> Result<bool, ServiceError> {
        if codes.is_empty() {
            return Ok(false);
        }
        let permissions = self.permissions_for(principal).await?;
        if permissions.contains(WILDCARD_PERMISSION) {
            return Ok(true);
        }
        let granted = |code: &&str| !code.is_empty() && permissions.contains(*code);
        Ok(match logical {
            Logical::And => codes.iter().all(granted),
            Logical::Or => codes.iter().any(granted),
        })
    }

    /// Evict cache entries touching any of the given roles. Called when a
    /// role's grants change.
    pub fn invalidate(&self, role_codes: &[String]) {
        self.cache.retain(|key, _| {
            !key.split(',')
                .any(|cached_role| role_codes.iter().any(|r| r == cached_role))
        });
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// The navigational menu tree for the principal's roles: directory- and
    /// menu-kind nodes linked by parent id, siblings ordered by order_num
    /// (ties by menu id). Buttons are excluded.
    pub async fn menu_tree_for(
        &self,
        principal: &Principal,
    ) -> Result<Vec<MenuTreeNode>, ServiceError> {
        let nodes = self.menu_nodes(principal).await?;
        let visible: Vec<MenuNode> = nodes
            .into_iter()
            .filter(|n| n.kind != MenuKind::Button)
            .collect();
        Ok(build_tree(&visible, 0))
    }

    /// Button permission codes grouped by the owning menu id.
    pub async fn button_permissions_for(
        &self,
        principal: &Principal,
    ) -> Result<BTreeMap<i64, BTreeSet<String>>, ServiceError> {
        let nodes = self.menu_nodes(principal).await?;
        let mut grouped: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
        for node in nodes {
            if node.kind == MenuKind::Button {
                if let Some(code) = node.perm_code {
                    grouped.entry(node.parent_id).or_default().insert(code);
                }
            }
        }
        Ok(grouped)
    }

    async fn menu_nodes(&self, principal: &Principal) -> Result<Vec<MenuNode>, ServiceError> {
        if principal.roles.is_empty() {
            return Ok(Vec::new());
        }
        directory_read(&self.retry, "menu_nodes_for_roles", || {
            self.directory.menu_nodes_for_roles(&principal.roles)
        })
        .await
    }
}

fn build_tree(nodes: &[MenuNode], parent_id: i64) -> Vec<MenuTreeNode> {
    let mut children: Vec<MenuTreeNode> = nodes
        .iter()
        .filter(|n| n.parent_id == parent_id)
        .map(|n| MenuTreeNode {
            node: n.clone(),
            children: build_tree(nodes, n.menu_id),
        })
        .collect();
    children.sort_by_key(|c| (c.node.order_num, c.node.menu_id));
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataScope, PrincipalStatus, RoleGrant};
    use crate::services::directory::StaticDirectory;
    use uuid::Uuid;

    fn principal(roles: &[&str]) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            status: PrincipalStatus::Active,
            roles: roles.iter().map(|s| s.to_string()).collect(),
            dept_id: None,
        }
    }

    fn grant(role: &str, permissions: &[&str]) -> RoleGrant {
        RoleGrant {
            role_code: role.to_string(),
            data_scope: DataScope::SelfOnly,
            custom_dept_ids: Vec::new(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn resolver(directory: Arc<StaticDirectory>) -> PermissionResolver {
        PermissionResolver::new(directory, "admin".to_string())
    }

    #[tokio::test]
    async fn permissions_union_across_roles() {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_grant(grant("ops", &["system:user:list", "system:user:query"]));
        directory.add_grant(grant("audit", &["monitor:session:list"]));

        let resolver = resolver(directory);
        let perms = resolver
            .permissions_for(&principal(&["ops", "audit"]))
            .await
            .unwrap();

        assert_eq!(perms.len(), 3);
        assert!(perms.contains("system:user:list"));
        assert!(perms.contains("monitor:session:list"));
    }

    #[tokio::test]
    async fn no_roles_resolves_to_empty_set() {
        let resolver = resolver(Arc::new(StaticDirectory::new()));
        let perms = resolver.permissions_for(&principal(&[])).await.unwrap();
        assert!(perms.is_empty());
    }

    #[tokio::test]
    async fn super_admin_bypass_precedes_cache_and_directory() {
        // A failing directory proves the bypass never reaches it.
        let directory = Arc::new(StaticDirectory::new());
        directory.set_failing(true);

        let resolver = resolver(directory);
        let admin = principal(&["admin", "ops"]);

        assert!(resolver.has_permission(&admin, "a:b:c").await.unwrap());
        assert!(resolver
            .check(&admin, &["x:y:z", "q:r:s"], Logical::And)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn and_or_logic() {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_grant(grant("ops", &["a:b:c"]));
        let resolver = resolver(directory);
        let p = principal(&["ops"]);

        assert!(resolver
            .check(&p, &["a:b:c", "a:b:d"], Logical::Or)
            .await
            .unwrap());
        assert!(!resolver
            .check(&p, &["a:b:c", "a:b:d"], Logical::And)
            .await
            .unwrap());
        assert!(!resolver.check(&p, &[], Logical::Or).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_code_denied() {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_grant(grant("ops", &["a:b:d"]));
        let resolver = resolver(directory);
        let p = principal(&["ops"]);

        assert!(!resolver.has_permission(&p, "a:b:c").await.unwrap());
        assert!(resolver.has_permission(&p, "a:b:d").await.unwrap());
        assert!(!resolver.has_permission(&p, "").await.unwrap());
    }

    #[tokio::test]
    async fn cache_shared_and_invalidated() {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_grant(grant("ops", &["a:b:c"]));
        let resolver = resolver(directory.clone());
        let p = principal(&["ops"]);

        assert!(resolver.has_permission(&p, "a:b:c").await.unwrap());

        // Grant changes are invisible until invalidation.
        directory.add_grant(grant("ops", &["a:b:c", "a:b:d"]));
        assert!(!resolver.has_permission(&p, "a:b:d").await.unwrap());

        resolver.invalidate(&["ops".to_string()]);
        assert!(resolver.has_permission(&p, "a:b:d").await.unwrap());
    }

    #[tokio::test]
    async fn directory_outage_is_not_a_denial() {
        let directory = Arc::new(StaticDirectory::new());
        directory.set_failing(true);
        let resolver = resolver(directory);

        let result = resolver.has_permission(&principal(&["ops"]), "a:b:c").await;
        assert!(matches!(result, Err(ServiceError::DirectoryUnavailable)));
    }

    #[tokio::test]
    async fn menu_tree_orders_and_excludes_buttons() {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_grant(grant("ops", &[]));
        let menu = |id, parent, order, kind, perm: Option<&str>| MenuNode {
            menu_id: id,
            parent_id: parent,
            label: format!("m{}", id),
            order_num: order,
            kind,
            perm_code: perm.map(|s| s.to_string()),
        };
        directory.add_menu(menu(1, 0, 2, MenuKind::Directory, None), &["ops"]);
        directory.add_menu(menu(2, 0, 1, MenuKind::Directory, None), &["ops"]);
        directory.add_menu(menu(3, 1, 1, MenuKind::Menu, Some("a:b:list")), &["ops"]);
        directory.add_menu(menu(4, 3, 1, MenuKind::Button, Some("a:b:add")), &["ops"]);
        directory.add_menu(menu(5, 3, 2, MenuKind::Button, Some("a:b:del")), &["ops"]);

        let resolver = resolver(directory);
        let p = principal(&["ops"]);

        let tree = resolver.menu_tree_for(&p).await.unwrap();
        assert_eq!(tree.len(), 2);
        // order_num 1 sorts before 2
        assert_eq!(tree[0].node.menu_id, 2);
        assert_eq!(tree[1].node.menu_id, 1);
        assert_eq!(tree[1].children[0].node.menu_id, 3);
        // button nodes never appear in the tree
        assert!(tree[1].children[0].children.is_empty());

        let buttons = resolver.button_permissions_for(&p).await.unwrap();
        let under_menu_3 = buttons.get(&3).unwrap();
        assert!(under_menu_3.contains("a:b:add"));
        assert!(under_menu_3.contains("a:b:del"));
    }
}
