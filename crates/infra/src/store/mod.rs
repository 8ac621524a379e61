//! Storage ports for the authorization core.
//!
//! The core reads users, tenants and roles through simple keyed lookups and
//! is the sole writer of grants, role-grant bindings and audit records.
//! Every port has an in-memory implementation (tests/dev) and a Postgres
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use haulbase_auth::{Permission, RoleName, UserSessionState};
use haulbase_core::{AuditRecordId, GrantId, Page, PageRequest, RoleId, TenantId, UserId};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Tenant (operator) as read by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    pub tax_id: Option<String>,
    pub is_super_tenant: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// User as read by the core. Credentials stay with the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub active: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn session_state(&self) -> UserSessionState {
        UserSessionState {
            active: self.active,
            last_activity_at: self.last_activity_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    #[serde(rename = "operatorId")]
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantRecord {
    pub id: GrantId,
    pub resource: String,
    pub action: String,
}

impl GrantRecord {
    pub fn permission(&self) -> Permission {
        Permission::new(self.resource.clone(), self.action.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub tenant_id: Option<TenantId>,
    /// Case-insensitive substring of the role name.
    pub search: Option<String>,
}

/// Audit record ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditRecord {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub action: String,
    pub resource: Option<String>,
    pub resource_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub user_id: UserId,
    #[serde(rename = "operatorId")]
    pub tenant_id: TenantId,
    pub action: String,
    pub resource: Option<String>,
    pub resource_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUserRef {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRef {
    pub id: TenantId,
    pub name: String,
}

/// Audit record joined with minimal display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecordView {
    #[serde(flatten)]
    pub record: AuditRecord,
    pub user: Option<AuditUserRef>,
    pub operator: Option<OperatorRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    /// Substring of the action name.
    pub action: Option<String>,
    pub resource: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.user_id.is_none_or(|u| record.user_id == u)
            && self.tenant_id.is_none_or(|t| record.tenant_id == t)
            && self
                .action
                .as_deref()
                .is_none_or(|a| record.action.contains(a))
            && self
                .resource
                .as_deref()
                .is_none_or(|r| record.resource.as_deref() == Some(r))
            && self.start.is_none_or(|s| record.created_at >= s)
            && self.end.is_none_or(|e| record.created_at <= e)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_tenant(&self, id: TenantId) -> StoreResult<Option<TenantRecord>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    /// Persist the activity timestamp of an authenticated request.
    async fn touch_last_activity(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn count_users_with_role(&self, role_id: RoleId) -> StoreResult<u64>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert_role(&self, tenant_id: TenantId, name: &RoleName) -> StoreResult<RoleRecord>;

    async fn find_role(&self, id: RoleId) -> StoreResult<Option<RoleRecord>>;

    /// Exact-name lookup within one tenant.
    async fn find_role_by_name(&self, tenant_id: TenantId, name: &str) -> StoreResult<Option<RoleRecord>>;

    async fn rename_role(&self, id: RoleId, name: &RoleName) -> StoreResult<RoleRecord>;

    /// Remove the role's bindings, then the role itself.
    async fn delete_role(&self, id: RoleId) -> StoreResult<()>;

    /// Newest first.
    async fn list_roles(&self, filter: &RoleFilter, page: PageRequest) -> StoreResult<Page<RoleRecord>>;
}

/// Grant Store and Role-Grant Associator.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Idempotent upsert keyed by `(resource, action)`.
    async fn ensure_grant(&self, permission: &Permission) -> StoreResult<GrantRecord>;

    async fn list_grants(&self) -> StoreResult<Vec<GrantRecord>>;

    async fn role_grants(&self, role_id: RoleId) -> StoreResult<Vec<GrantRecord>>;

    /// Replace every binding of `role_id` with `grant_ids`.
    ///
    /// Readers never observe a partially replaced set.
    async fn replace_role_grants(&self, role_id: RoleId, grant_ids: &[GrantId]) -> StoreResult<()>;

    async fn has_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<bool>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: NewAuditRecord) -> StoreResult<AuditRecordId>;

    /// Newest first.
    async fn query(&self, filter: &AuditFilter, page: PageRequest) -> StoreResult<Page<AuditRecordView>>;

    async fn find(&self, id: AuditRecordId) -> StoreResult<Option<AuditRecordView>>;

    /// Most recent records of one user, newest first.
    async fn user_activity(&self, user_id: UserId, limit: u32) -> StoreResult<Vec<AuditRecordView>>;
}
