//! Service wiring: storage backends in, request-facing services out.

use std::sync::Arc;

use chrono::Duration;

use haulbase_auth::{Hs256JwtIssuer, Hs256JwtValidator, OperationRegistry, SessionPolicy};
use haulbase_infra::audit::{AuditQueryService, AuditRecorder, AuditWorker, AuditWorkerHandle};
use haulbase_infra::store::{
    AuditStore, GrantStore, InMemoryStore, PostgresStore, RoleStore, StoreResult, TenantDirectory, UserDirectory,
};
use haulbase_infra::{AuthorizationEngine, CredentialService, RoleService, SessionAuthenticator};

use crate::config::AppConfig;

/// Storage ports the services are built from.
#[derive(Clone)]
pub struct Stores {
    pub tenants: Arc<dyn TenantDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub roles: Arc<dyn RoleStore>,
    pub grants: Arc<dyn GrantStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    /// Every port served by one backend.
    pub fn single<S>(backend: Arc<S>) -> Self
    where
        S: TenantDirectory + UserDirectory + RoleStore + GrantStore + AuditStore + 'static,
    {
        Self {
            tenants: backend.clone(),
            users: backend.clone(),
            roles: backend.clone(),
            grants: backend.clone(),
            audit: backend,
        }
    }

    pub fn in_memory() -> (Self, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Self::single(store.clone()), store)
    }

    pub async fn postgres(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let store = PostgresStore::connect(database_url, max_connections).await?;
        Ok(Self::single(Arc::new(store)))
    }
}

/// Tunables the services need; derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub inactivity_timeout: Duration,
    pub audit_queue_capacity: usize,
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret_or_default().to_string(),
            token_ttl: Duration::hours(config.auth.token_ttl_hours),
            inactivity_timeout: Duration::minutes(config.auth.inactivity_timeout_minutes),
            audit_queue_capacity: config.audit.queue_capacity,
        }
    }

    /// Defaults with an explicit signing secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        let mut settings = Self::from_config(&AppConfig::default());
        settings.jwt_secret = secret.into();
        settings
    }
}

pub struct AppServices {
    pub authenticator: SessionAuthenticator,
    pub credentials: CredentialService,
    pub authz: AuthorizationEngine,
    pub roles: RoleService,
    pub audit_log: AuditQueryService,
    pub audit: AuditRecorder,
}

impl AppServices {
    /// Wire the services and start the audit worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(stores: Stores, settings: &ServiceSettings, registry: OperationRegistry) -> (Self, AuditWorkerHandle) {
        let validator = Arc::new(Hs256JwtValidator::new(settings.jwt_secret.as_bytes()));
        let issuer = Arc::new(Hs256JwtIssuer::with_ttl(settings.jwt_secret.as_bytes(), settings.token_ttl));
        let (recorder, worker) = AuditWorker::spawn(stores.audit.clone(), settings.audit_queue_capacity);

        let services = Self {
            authenticator: SessionAuthenticator::new(
                validator,
                stores.users.clone(),
                SessionPolicy::new(settings.inactivity_timeout),
            ),
            credentials: CredentialService::new(issuer, stores.users.clone(), stores.tenants.clone()),
            authz: AuthorizationEngine::new(Arc::new(registry), stores.grants.clone()),
            roles: RoleService::new(stores.roles, stores.grants, stores.tenants, stores.users),
            audit_log: AuditQueryService::new(stores.audit),
            audit: recorder,
        };

        (services, worker)
    }
}
