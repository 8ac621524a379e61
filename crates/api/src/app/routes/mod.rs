use axum::Router;

use haulbase_auth::{OperationRegistry, RegistryError};

pub mod audit;
pub mod auth;
pub mod grants;
pub mod rbac;
pub mod roles;
pub mod system;

/// Router for all authenticated endpoints.
///
/// Paths are spelled out in full (no nesting) so the matched route template
/// is exactly the operation id the registry is keyed by.
pub fn router() -> Router {
    Router::new()
        .merge(system::router())
        .merge(auth::router())
        .merge(roles::router())
        .merge(grants::router())
        .merge(rbac::router())
        .merge(audit::router())
}

/// Permission declarations of every protected operation.
pub fn registry() -> Result<OperationRegistry, RegistryError> {
    let mut registry = OperationRegistry::new();
    roles::declare(&mut registry)?;
    grants::declare(&mut registry)?;
    audit::declare(&mut registry)?;
    Ok(registry)
}
