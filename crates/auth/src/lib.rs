//! `haulbase-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it verifies
//! credentials, models permissions, and makes every decision that does not
//! need a storage lookup.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod registry;
pub mod roles;
pub mod session;

pub use authorize::{authorize, conclude, explain_authorization, AllowReason, AuthorizationExplanation, Verdict};
pub use claims::{validate_claims, CredentialClaims, IssuedIdentity, TokenValidationError};
pub use error::{AuthError, ForbiddenReason, UnauthorizedReason};
pub use jwt::{Hs256JwtIssuer, Hs256JwtValidator, IssuedCredential, JwtValidator};
pub use permissions::{parse_permission_set, Permission, MAX_ACTION_LEN, MAX_RESOURCE_LEN};
pub use principal::Caller;
pub use registry::{OperationId, OperationRegistry, RegistryError};
pub use roles::RoleName;
pub use session::{SessionPolicy, UserSessionState, INACTIVITY_TIMEOUT_MINUTES};
