//! HS256 credential signing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use crate::claims::{validate_claims, CredentialClaims, IssuedIdentity};
use crate::{AuthError, UnauthorizedReason};

/// Fixed validity window of an issued credential.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Verifies a bearer credential and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, AuthError>;
}

/// Shared-secret (HS256) validator.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialClaims, AuthError> {
        let data = jsonwebtoken::decode::<CredentialClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "credential rejected");
                AuthError::Unauthorized(UnauthorizedReason::InvalidCredential)
            })?;

        validate_claims(&data.claims, now).map_err(|e| {
            tracing::debug!(error = %e, "credential outside its validity window");
            AuthError::Unauthorized(UnauthorizedReason::InvalidCredential)
        })?;

        Ok(data.claims)
    }
}

#[derive(Debug, Error)]
#[error("failed to sign credential: {0}")]
pub struct IssueError(String);

/// A freshly signed credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Shared-secret (HS256) issuer.
#[derive(Clone)]
pub struct Hs256JwtIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl Hs256JwtIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self::with_ttl(secret, Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_ref()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &IssuedIdentity, now: DateTime<Utc>) -> Result<IssuedCredential, IssueError> {
        let claims = CredentialClaims::for_identity(identity, now, self.ttl);
        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| IssueError(e.to_string()))?;

        Ok(IssuedCredential {
            access_token,
            expires_at: now + self.ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haulbase_core::{RoleId, TenantId, UserId};

    fn identity() -> IssuedIdentity {
        IssuedIdentity {
            user_id: UserId::new(10),
            username: "ops".into(),
            email: "ops@example.com".into(),
            tenant_id: TenantId::new(1),
            role_id: RoleId::new(4),
            is_super_tenant: true,
        }
    }

    #[test]
    fn issued_credential_round_trips_through_validator() {
        let issuer = Hs256JwtIssuer::new("secret");
        let validator = Hs256JwtValidator::new("secret");
        let now = Utc::now();

        let credential = issuer.issue(&identity(), now).unwrap();
        let claims = validator.validate(&credential.access_token, now).unwrap();

        assert_eq!(claims.sub, UserId::new(10));
        assert_eq!(claims.role_id, RoleId::new(4));
        assert!(claims.is_super);
        assert_eq!(claims.exp - claims.iat, Duration::hours(24).num_seconds());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let credential = Hs256JwtIssuer::new("secret").issue(&identity(), Utc::now()).unwrap();
        let err = Hs256JwtValidator::new("other")
            .validate(&credential.access_token, Utc::now())
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthorized(UnauthorizedReason::InvalidCredential));
    }

    #[test]
    fn expired_credential_is_rejected() {
        let issued = Utc::now() - Duration::hours(30);
        let credential = Hs256JwtIssuer::new("secret").issue(&identity(), issued).unwrap();
        let err = Hs256JwtValidator::new("secret")
            .validate(&credential.access_token, Utc::now())
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthorized(UnauthorizedReason::InvalidCredential));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = Hs256JwtValidator::new("secret")
            .validate("not-a-token", Utc::now())
            .unwrap_err();
        assert!(err.is_unauthorized());
    }
}
