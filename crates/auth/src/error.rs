//! Authentication/authorization error taxonomy.

use thiserror::Error;

/// Why a caller could not be authenticated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnauthorizedReason {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid or expired credential")]
    InvalidCredential,

    #[error("user not found")]
    UserNotFound,

    #[error("account inactive")]
    AccountInactive,

    #[error("session expired due to inactivity")]
    InactivityExpired,
}

/// Why an authenticated (or absent) caller was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForbiddenReason {
    #[error("missing permission {resource}:{action}")]
    MissingPermission { resource: String, action: String },

    #[error("not authenticated")]
    NotAuthenticated,
}

/// Errors surfaced by the authorization core.
///
/// Authentication and authorization failures short-circuit a request before
/// any business logic runs; `BadRequest` covers role/grant data integrity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    #[error("forbidden: {0}")]
    Forbidden(ForbiddenReason),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AuthError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn missing_permission(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Forbidden(ForbiddenReason::MissingPermission {
            resource: resource.into(),
            action: action.into(),
        })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

impl From<UnauthorizedReason> for AuthError {
    fn from(reason: UnauthorizedReason) -> Self {
        Self::Unauthorized(reason)
    }
}

impl From<ForbiddenReason> for AuthError {
    fn from(reason: ForbiddenReason) -> Self {
        Self::Forbidden(reason)
    }
}
