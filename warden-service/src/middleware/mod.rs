pub mod auth;
pub mod metrics;
pub mod permission;

pub use auth::{auth_middleware, CurrentUser, RawCredential};
pub use metrics::track_metrics;
pub use permission::{require_permissions, PermissionPolicy};
