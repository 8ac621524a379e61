//! Session authentication: credential verification plus per-request
//! liveness checks against the user directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use haulbase_auth::{Caller, Hs256JwtIssuer, IssuedCredential, IssuedIdentity, JwtValidator, SessionPolicy};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{TenantDirectory, UserDirectory};

/// Resolves a bearer credential into a [`Caller`].
#[derive(Clone)]
pub struct SessionAuthenticator {
    validator: Arc<dyn JwtValidator>,
    users: Arc<dyn UserDirectory>,
    policy: SessionPolicy,
}

impl SessionAuthenticator {
    pub fn new(validator: Arc<dyn JwtValidator>, users: Arc<dyn UserDirectory>, policy: SessionPolicy) -> Self {
        Self {
            validator,
            users,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Verify `token` and re-check the user's account state at `now`.
    ///
    /// On success the user's last-activity timestamp is advanced to `now`.
    /// Role, tenant and super-tenant flag come from the credential itself.
    pub async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> ServiceResult<Caller> {
        let claims = self.validator.validate(token, now)?;

        let user = self.users.find_user(claims.sub).await?;
        let state = user.as_ref().map(|u| u.session_state());
        if let Err(err) = self.policy.check(state.as_ref(), now) {
            debug!(user_id = %claims.sub, error = %err, "session rejected");
            return Err(err.into());
        }

        self.users
            .touch_last_activity(claims.sub, now)
            .await
            .inspect_err(|err| warn!(user_id = %claims.sub, error = %err, "failed to record user activity"))?;

        Ok(Caller::from(claims))
    }
}

/// Re-issues credentials from the current stored identity.
#[derive(Clone)]
pub struct CredentialService {
    issuer: Arc<Hs256JwtIssuer>,
    users: Arc<dyn UserDirectory>,
    tenants: Arc<dyn TenantDirectory>,
}

impl CredentialService {
    pub fn new(issuer: Arc<Hs256JwtIssuer>, users: Arc<dyn UserDirectory>, tenants: Arc<dyn TenantDirectory>) -> Self {
        Self { issuer, users, tenants }
    }

    /// Mint a fresh credential for an authenticated caller.
    ///
    /// Role, tenant and super-tenant flag are re-read, so changes made since
    /// the previous credential was issued take effect here.
    pub async fn reissue(&self, caller: &Caller, now: DateTime<Utc>) -> ServiceResult<IssuedCredential> {
        let user = self
            .users
            .find_user(caller.id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("user {}", caller.id)))?;

        let tenant = self
            .tenants
            .find_tenant(user.tenant_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("operator {}", user.tenant_id)))?;

        let identity = IssuedIdentity {
            user_id: user.id,
            username: user.username,
            email: user.email,
            tenant_id: user.tenant_id,
            role_id: user.role_id,
            is_super_tenant: tenant.is_super_tenant,
        };

        self.issuer
            .issue(&identity, now)
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use haulbase_auth::{AuthError, Hs256JwtValidator, UnauthorizedReason};
    use haulbase_core::{RoleId, TenantId, UserId};

    use crate::store::{InMemoryStore, TenantRecord, UserRecord};

    const SECRET: &str = "session-test-secret";

    fn seed(store: &InMemoryStore, is_super: bool) {
        store
            .insert_tenant(TenantRecord {
                id: TenantId::new(1),
                name: "Andes Freight".into(),
                tax_id: None,
                is_super_tenant: is_super,
                expires_at: None,
                active: true,
            })
            .unwrap();
        store
            .insert_user(UserRecord {
                id: UserId::new(7),
                username: "dispatcher".into(),
                email: "dispatcher@example.com".into(),
                first_name: "Dana".into(),
                last_name: "Ruiz".into(),
                tenant_id: TenantId::new(1),
                role_id: RoleId::new(3),
                active: true,
                last_activity_at: None,
            })
            .unwrap();
    }

    fn token_for(is_super: bool, now: DateTime<Utc>) -> String {
        Hs256JwtIssuer::new(SECRET)
            .issue(
                &IssuedIdentity {
                    user_id: UserId::new(7),
                    username: "dispatcher".into(),
                    email: "dispatcher@example.com".into(),
                    tenant_id: TenantId::new(1),
                    role_id: RoleId::new(3),
                    is_super_tenant: is_super,
                },
                now,
            )
            .unwrap()
            .access_token
    }

    fn authenticator(store: Arc<InMemoryStore>) -> SessionAuthenticator {
        SessionAuthenticator::new(Arc::new(Hs256JwtValidator::new(SECRET)), store, SessionPolicy::default())
    }

    fn unauthorized(err: ServiceError) -> UnauthorizedReason {
        match err {
            ServiceError::Auth(AuthError::Unauthorized(reason)) => reason,
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_request_succeeds_and_records_activity() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, false);
        let now = Utc::now();

        let caller = authenticator(store.clone())
            .authenticate(&token_for(false, now), now)
            .await
            .unwrap();

        assert_eq!(caller.id, UserId::new(7));
        let user = store.find_user(UserId::new(7)).await.unwrap().unwrap();
        assert_eq!(user.last_activity_at, Some(now));
    }

    #[tokio::test]
    async fn recent_activity_is_accepted_and_advanced() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, false);
        let now = Utc::now();
        store
            .set_last_activity(UserId::new(7), Some(now - Duration::minutes(29)))
            .unwrap();

        let caller = authenticator(store.clone())
            .authenticate(&token_for(false, now), now)
            .await
            .unwrap();

        assert_eq!(caller.role_id, RoleId::new(3));
        let user = store.find_user(UserId::new(7)).await.unwrap().unwrap();
        assert_eq!(user.last_activity_at, Some(now));
    }

    #[tokio::test]
    async fn idle_session_is_rejected_and_activity_untouched() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, false);
        let now = Utc::now();
        let last = now - Duration::minutes(31);
        store.set_last_activity(UserId::new(7), Some(last)).unwrap();

        let err = authenticator(store.clone())
            .authenticate(&token_for(false, now), now)
            .await
            .unwrap_err();

        assert_eq!(unauthorized(err), UnauthorizedReason::InactivityExpired);
        let user = store.find_user(UserId::new(7)).await.unwrap().unwrap();
        assert_eq!(user.last_activity_at, Some(last));
    }

    #[tokio::test]
    async fn inactive_or_missing_user_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, false);
        let now = Utc::now();
        let auth = authenticator(store.clone());

        store.set_user_active(UserId::new(7), false).unwrap();
        let err = auth.authenticate(&token_for(false, now), now).await.unwrap_err();
        assert_eq!(unauthorized(err), UnauthorizedReason::AccountInactive);

        let empty = authenticator(Arc::new(InMemoryStore::new()));
        let err = empty.authenticate(&token_for(false, now), now).await.unwrap_err();
        assert_eq!(unauthorized(err), UnauthorizedReason::UserNotFound);
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, false);
        let now = Utc::now();
        let mut token = token_for(false, now);
        token.push('x');

        let err = authenticator(store).authenticate(&token, now).await.unwrap_err();
        assert_eq!(unauthorized(err), UnauthorizedReason::InvalidCredential);
    }

    #[tokio::test]
    async fn claims_are_trusted_until_reissue() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, true);
        let now = Utc::now();
        let token = token_for(false, now);

        // Tenant was promoted after issuance; the credential still says otherwise.
        let caller = authenticator(store.clone()).authenticate(&token, now).await.unwrap();
        assert!(!caller.is_super_tenant);

        let credentials = CredentialService::new(Arc::new(Hs256JwtIssuer::new(SECRET)), store.clone(), store.clone());
        let fresh = credentials.reissue(&caller, now).await.unwrap();

        let caller = authenticator(store).authenticate(&fresh.access_token, now).await.unwrap();
        assert!(caller.is_super_tenant);
    }
}
