//! Infrastructure layer: storage adapters and the services that need them.

pub mod audit;
pub mod authz;
pub mod error;
pub mod rbac;
pub mod session;
pub mod store;

pub use authz::AuthorizationEngine;
pub use error::{ServiceError, ServiceResult};
pub use rbac::{CreateRole, RoleService, RoleView, UpdateRole};
pub use session::{CredentialService, SessionAuthenticator};
