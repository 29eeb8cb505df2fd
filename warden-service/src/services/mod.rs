pub mod auth;
pub mod directory;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod permissions;
pub mod registry;
pub mod revocation;
pub mod scope;
pub mod store;
pub mod token;

pub use auth::AuthService;
pub use directory::{Directory, PgDirectory, StaticDirectory};
pub use error::ServiceError;
pub use gate::AuthorizationGate;
pub use permissions::{Logical, PermissionResolver};
pub use registry::{spawn_sweeper, SessionRegistry};
pub use revocation::{
    credential_key, MemoryRevocationIndex, RedisRevocationIndex, RevocationIndex,
};
pub use scope::{DataScopeResolver, QueryPredicate, ScopeDecision};
pub use store::{MemorySessionStore, PgSessionStore, SessionStore};
pub use token::{AccessClaims, TokenIssuer, TokenResponse};
