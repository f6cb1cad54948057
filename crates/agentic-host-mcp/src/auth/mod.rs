//! Credential → principal resolution through an ordered chain of strategies,
//! and the scope checks applied to a resolved principal.

pub mod access;
pub mod bearer;
pub mod manager;
pub mod principal;

pub use access::{
    AccessPolicy, AllowAllAccess, ScopeAccessPolicy, SCOPE_ALL, SCOPE_RESOURCES_READ,
    SCOPE_TOOLS_CALL,
};
pub use bearer::{BearerTokenStrategy, StaticTokenResolver, TokenResolver};
pub use manager::{AuthorizationManager, AuthorizationStrategy};
pub use principal::Principal;
