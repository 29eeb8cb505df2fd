//! Role grant model - data scopes, permission codes and menu nodes.

use serde::{Deserialize, Serialize};

/// Breadth of organizational data a role may see. Stored as small integer
/// tags. Priority is NOT tag order: `DeptAndChild` (tag 4) outranks `Dept`
/// (tag 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    All,
    Custom,
    Dept,
    DeptAndChild,
    SelfOnly,
}

impl DataScope {
    pub fn as_i16(&self) -> i16 {
        match self {
            DataScope::All => 1,
            DataScope::Custom => 2,
            DataScope::Dept => 3,
            DataScope::DeptAndChild => 4,
            DataScope::SelfOnly => 5,
        }
    }

    pub fn from_i16(tag: i16) -> Self {
        match tag {
            1 => DataScope::All,
            2 => DataScope::Custom,
            3 => DataScope::Dept,
            4 => DataScope::DeptAndChild,
            _ => DataScope::SelfOnly,
        }
    }

    /// Permissiveness rank; higher wins when a principal holds several roles.
    pub fn rank(&self) -> u8 {
        match self {
            DataScope::All => 4,
            DataScope::Custom => 3,
            DataScope::DeptAndChild => 2,
            DataScope::Dept => 1,
            DataScope::SelfOnly => 0,
        }
    }
}

/// Everything a role grants: scope, custom departments, permission codes.
/// Adjacency sets owned by the role; read-only from the engine's side.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub role_code: String,
    pub data_scope: DataScope,
    pub custom_dept_ids: Vec<i64>,
    pub permissions: Vec<String>,
}

/// Menu node kind. Buttons carry permission codes but never appear in the
/// navigational tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuKind {
    Directory,
    Menu,
    Button,
}

impl MenuKind {
    pub fn as_i16(&self) -> i16 {
        match self {
            MenuKind::Directory => 1,
            MenuKind::Menu => 2,
            MenuKind::Button => 3,
        }
    }

    pub fn from_i16(tag: i16) -> Self {
        match tag {
            1 => MenuKind::Directory,
            2 => MenuKind::Menu,
            _ => MenuKind::Button,
        }
    }
}

/// Flat menu node as the directory stores it. `parent_id == 0` marks a root.
#[derive(Debug, Clone, Serialize)]
pub struct MenuNode {
    pub menu_id: i64,
    pub parent_id: i64,
    pub label: String,
    pub order_num: i32,
    pub kind: MenuKind,
    pub perm_code: Option<String>,
}

/// Tree node with children for hierarchical response.
#[derive(Debug, Serialize)]
pub struct MenuTreeNode {
    #[serde(flatten)]
    pub node: MenuNode,
    pub children: Vec<MenuTreeNode>,
}
