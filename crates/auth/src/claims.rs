use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use haulbase_core::{RoleId, TenantId, UserId};

/// Credential claims (transport-agnostic).
///
/// Role, tenant and super-tenant flag are captured at issuance and trusted
/// for the lifetime of the credential; only the account status and the
/// inactivity window are re-checked against storage per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    pub username: String,

    pub email: String,

    /// Owning tenant of the subject.
    pub operator_id: TenantId,

    pub role_id: RoleId,

    /// Whether the owning tenant bypasses authorization checks.
    pub is_super: bool,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

/// Identity snapshot a credential is minted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedIdentity {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub is_super_tenant: bool,
}

impl CredentialClaims {
    pub fn for_identity(identity: &IssuedIdentity, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            operator_id: identity.tenant_id,
            role_id: identity.role_id,
            is_super: identity.is_super_tenant,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Tolerated lead of an issuer's clock over ours when checking `iat`.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim time window.
///
/// Signature verification happens in [`crate::jwt`]; this check is kept
/// separate so it can run against an injected clock.
pub fn validate_claims(claims: &CredentialClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now.timestamp() + MAX_CLOCK_SKEW_SECS < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> IssuedIdentity {
        IssuedIdentity {
            user_id: UserId::new(1),
            username: "dispatcher".into(),
            email: "dispatch@example.com".into(),
            tenant_id: TenantId::new(2),
            role_id: RoleId::new(3),
            is_super_tenant: false,
        }
    }

    #[test]
    fn claims_use_camel_case_wire_names() {
        let claims = CredentialClaims::for_identity(&identity(), Utc::now(), Duration::hours(24));
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["operatorId"], 2);
        assert_eq!(json["roleId"], 3);
        assert_eq!(json["isSuper"], false);
        assert_eq!(json["sub"], 1);
    }

    #[test]
    fn validates_time_window() {
        let now = Utc::now();
        let claims = CredentialClaims::for_identity(&identity(), now, Duration::hours(24));
        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(
            validate_claims(&claims, now + Duration::hours(25)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims, now - Duration::minutes(5)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn tolerates_small_issuer_clock_lead() {
        let now = Utc::now();
        let claims = CredentialClaims::for_identity(&identity(), now + Duration::seconds(30), Duration::hours(24));
        assert_eq!(validate_claims(&claims, now), Ok(()));

        let claims = CredentialClaims::for_identity(
            &identity(),
            now + Duration::seconds(MAX_CLOCK_SKEW_SECS + 5),
            Duration::hours(24),
        );
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let mut claims = CredentialClaims::for_identity(&identity(), now, Duration::hours(1));
        claims.exp = claims.iat;
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::InvalidTimeWindow));
    }
}
