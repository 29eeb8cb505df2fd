//! Department model - external hierarchy used for scope expansion.

use sqlx::FromRow;

/// Department with its flattened ancestor chain (comma-joined ids from the
/// root, empty for a root department).
#[derive(Debug, Clone, FromRow)]
pub struct DepartmentNode {
    pub dept_id: i64,
    pub parent_id: i64,
    pub ancestors: String,
}

impl DepartmentNode {
    pub fn ancestor_ids(&self) -> Vec<i64> {
        self.ancestors
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    pub fn has_ancestor(&self, dept_id: i64) -> bool {
        self.ancestor_ids().contains(&dept_id)
    }
}
