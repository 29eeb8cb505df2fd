pub mod department;
pub mod grant;
pub mod principal;
pub mod session;

pub use department::DepartmentNode;
pub use grant::{DataScope, MenuKind, MenuNode, MenuTreeNode, RoleGrant};
pub use principal::{LoginUser, Principal, PrincipalStatus};
pub use session::{RefreshSession, RevokeReason, SessionInfo, SessionPolicy};
