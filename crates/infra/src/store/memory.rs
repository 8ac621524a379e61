use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use haulbase_auth::{Permission, RoleName};
use haulbase_core::{AuditRecordId, GrantId, Page, PageRequest, RoleId, TenantId, UserId};

use super::{
    AuditFilter, AuditRecord, AuditRecordView, AuditStore, AuditUserRef, GrantRecord, GrantStore,
    NewAuditRecord, OperatorRef, RoleFilter, RoleRecord, RoleStore, StoreError, StoreResult, TenantDirectory,
    TenantRecord, UserDirectory, UserRecord,
};

#[derive(Debug, Default)]
struct State {
    tenants: BTreeMap<TenantId, TenantRecord>,
    users: BTreeMap<UserId, UserRecord>,
    roles: BTreeMap<RoleId, RoleRecord>,
    grants: BTreeMap<GrantId, GrantRecord>,
    grant_index: HashMap<(String, String), GrantId>,
    bindings: BTreeMap<RoleId, BTreeSet<GrantId>>,
    audit: Vec<AuditRecord>,
    next_role: i64,
    next_grant: i64,
    next_audit: i64,
}

impl State {
    fn audit_view(&self, record: &AuditRecord) -> AuditRecordView {
        let user = self.users.get(&record.user_id).map(|u| AuditUserRef {
            id: u.id,
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
        });
        let operator = self.tenants.get(&record.tenant_id).map(|t| OperatorRef {
            id: t.id,
            name: t.name.clone(),
        });
        AuditRecordView {
            record: record.clone(),
            user,
            operator,
        }
    }

    /// Newest first; ties broken by id so insertion order stays visible.
    fn audit_sorted<'a>(&'a self, filter: &AuditFilter) -> Vec<&'a AuditRecord> {
        let mut matching: Vec<&AuditRecord> = self.audit.iter().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching
    }
}

/// In-memory implementation of every storage port, for tests/dev.
///
/// A single lock guards all tables, so multi-table writes (role deletion,
/// binding replacement) are observed atomically.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    // ── Seeding (tenants and users are owned by other services) ──────────────

    pub fn insert_tenant(&self, tenant: TenantRecord) -> StoreResult<()> {
        self.write()?.tenants.insert(tenant.id, tenant);
        Ok(())
    }

    pub fn insert_user(&self, user: UserRecord) -> StoreResult<()> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn set_user_active(&self, id: UserId, active: bool) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.active = active;
        Ok(())
    }

    pub fn set_last_activity(&self, id: UserId, at: Option<DateTime<Utc>>) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.last_activity_at = at;
        Ok(())
    }

    /// Snapshot of every audit record in append order.
    pub fn audit_records(&self) -> StoreResult<Vec<AuditRecord>> {
        Ok(self.read()?.audit.clone())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn find_tenant(&self, id: TenantId) -> StoreResult<Option<TenantRecord>> {
        Ok(self.read()?.tenants.get(&id).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn touch_last_activity(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(user) = self.write()?.users.get_mut(&id) {
            user.last_activity_at = Some(at);
        }
        Ok(())
    }

    async fn count_users_with_role(&self, role_id: RoleId) -> StoreResult<u64> {
        Ok(self.read()?.users.values().filter(|u| u.role_id == role_id).count() as u64)
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn insert_role(&self, tenant_id: TenantId, name: &RoleName) -> StoreResult<RoleRecord> {
        let mut state = self.write()?;
        if state
            .roles
            .values()
            .any(|r| r.tenant_id == tenant_id && r.name == name.as_str())
        {
            return Err(StoreError::Conflict(format!("role name '{name}' already exists")));
        }

        state.next_role += 1;
        let now = Utc::now();
        let role = RoleRecord {
            id: RoleId::new(state.next_role),
            name: name.as_str().to_string(),
            tenant_id,
            created_at: now,
            updated_at: now,
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_role(&self, id: RoleId) -> StoreResult<Option<RoleRecord>> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn find_role_by_name(&self, tenant_id: TenantId, name: &str) -> StoreResult<Option<RoleRecord>> {
        Ok(self
            .read()?
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn rename_role(&self, id: RoleId, name: &RoleName) -> StoreResult<RoleRecord> {
        let mut state = self.write()?;
        let tenant_id = state
            .roles
            .get(&id)
            .map(|r| r.tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;

        if state
            .roles
            .values()
            .any(|r| r.id != id && r.tenant_id == tenant_id && r.name == name.as_str())
        {
            return Err(StoreError::Conflict(format!("role name '{name}' already exists")));
        }

        let role = state
            .roles
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))?;
        role.name = name.as_str().to_string();
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<()> {
        let mut state = self.write()?;
        state.bindings.remove(&id);
        state
            .roles
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("role {id}")))
    }

    async fn list_roles(&self, filter: &RoleFilter, page: PageRequest) -> StoreResult<Page<RoleRecord>> {
        let state = self.read()?;
        let needle = filter.search.as_deref().map(str::to_lowercase);

        let mut roles: Vec<RoleRecord> = state
            .roles
            .values()
            .filter(|r| filter.tenant_id.is_none_or(|t| r.tenant_id == t))
            .filter(|r| {
                needle
                    .as_deref()
                    .is_none_or(|n| r.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        roles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(Page::from_sorted(roles, page))
    }
}

#[async_trait]
impl GrantStore for InMemoryStore {
    async fn ensure_grant(&self, permission: &Permission) -> StoreResult<GrantRecord> {
        let mut state = self.write()?;
        let key = (permission.resource().to_string(), permission.action().to_string());

        if let Some(id) = state.grant_index.get(&key).copied() {
            if let Some(grant) = state.grants.get(&id) {
                return Ok(grant.clone());
            }
        }

        state.next_grant += 1;
        let grant = GrantRecord {
            id: GrantId::new(state.next_grant),
            resource: key.0.clone(),
            action: key.1.clone(),
        };
        state.grant_index.insert(key, grant.id);
        state.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn list_grants(&self) -> StoreResult<Vec<GrantRecord>> {
        let mut grants: Vec<GrantRecord> = self.read()?.grants.values().cloned().collect();
        grants.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(grants)
    }

    async fn role_grants(&self, role_id: RoleId) -> StoreResult<Vec<GrantRecord>> {
        let state = self.read()?;
        let mut grants: Vec<GrantRecord> = state
            .bindings
            .get(&role_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.grants.get(id).cloned())
            .collect();
        grants.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(grants)
    }

    async fn replace_role_grants(&self, role_id: RoleId, grant_ids: &[GrantId]) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if let Some(missing) = grant_ids.iter().find(|id| !state.grants.contains_key(id)) {
            return Err(StoreError::NotFound(format!("grant {missing}")));
        }

        state.bindings.insert(role_id, grant_ids.iter().copied().collect());
        Ok(())
    }

    async fn has_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<bool> {
        let state = self.read()?;
        let key = (permission.resource().to_string(), permission.action().to_string());
        let Some(grant_id) = state.grant_index.get(&key) else {
            return Ok(false);
        };
        Ok(state
            .bindings
            .get(&role_id)
            .is_some_and(|set| set.contains(grant_id)))
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append(&self, record: NewAuditRecord) -> StoreResult<AuditRecordId> {
        let mut state = self.write()?;
        state.next_audit += 1;
        let id = AuditRecordId::new(state.next_audit);
        state.audit.push(AuditRecord {
            id,
            user_id: record.user_id,
            tenant_id: record.tenant_id,
            action: record.action,
            resource: record.resource,
            resource_id: record.resource_id,
            details: record.details,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn query(&self, filter: &AuditFilter, page: PageRequest) -> StoreResult<Page<AuditRecordView>> {
        let state = self.read()?;
        let views: Vec<AuditRecordView> = state
            .audit_sorted(filter)
            .into_iter()
            .map(|r| state.audit_view(r))
            .collect();
        Ok(Page::from_sorted(views, page))
    }

    async fn find(&self, id: AuditRecordId) -> StoreResult<Option<AuditRecordView>> {
        let state = self.read()?;
        Ok(state.audit.iter().find(|r| r.id == id).map(|r| state.audit_view(r)))
    }

    async fn user_activity(&self, user_id: UserId, limit: u32) -> StoreResult<Vec<AuditRecordView>> {
        let state = self.read()?;
        let filter = AuditFilter {
            user_id: Some(user_id),
            ..AuditFilter::default()
        };
        Ok(state
            .audit_sorted(&filter)
            .into_iter()
            .take(limit as usize)
            .map(|r| state.audit_view(r))
            .collect())
    }
}
