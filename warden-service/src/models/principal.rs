//! Principal model - the authenticated identity for the duration of a request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account status codes, stored as small integer tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    Active,
    Disabled,
    Locked,
    Deleted,
}

impl PrincipalStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            PrincipalStatus::Active => 0,
            PrincipalStatus::Disabled => 1,
            PrincipalStatus::Locked => 2,
            PrincipalStatus::Deleted => 3,
        }
    }

    pub fn from_i16(tag: i16) -> Self {
        match tag {
            0 => PrincipalStatus::Active,
            1 => PrincipalStatus::Disabled,
            2 => PrincipalStatus::Locked,
            _ => PrincipalStatus::Deleted,
        }
    }
}

/// The resolved identity: immutable once constructed for a request.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub status: PrincipalStatus,
    pub roles: Vec<String>,
    pub dept_id: Option<i64>,
}

impl Principal {
    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }
}

/// Principal plus password hash; only the login path sees the hash.
#[derive(Debug, Clone)]
pub struct LoginUser {
    pub principal: Principal,
    pub password_hash: String,
}
