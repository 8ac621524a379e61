//! Role administration and the role-grant associator.
//!
//! Tenant scoping: every method taking `scope: Option<TenantId>` treats a
//! role outside the scope as nonexistent. `None` is the super-tenant view.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use haulbase_auth::{parse_permission_set, AuthError, Permission, RoleName};
use haulbase_core::{GrantId, Page, PageRequest, RoleId, TenantId};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{
    GrantRecord, GrantStore, OperatorRef, RoleFilter, RoleRecord, RoleStore, StoreError, TenantDirectory,
    UserDirectory,
};

/// A role with its permissions, as returned by the administration surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleView {
    #[serde(flatten)]
    pub role: RoleRecord,
    pub operator: Option<OperatorRef>,
    /// `resource.action` strings, sorted.
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRole {
    pub name: String,
    /// Ignored for tenant-scoped callers, who always create in their own tenant.
    #[serde(rename = "operatorId")]
    pub tenant_id: Option<TenantId>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRole {
    pub name: Option<String>,
    /// `Some(vec![])` clears every binding; `None` leaves them untouched.
    pub permissions: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    grants: Arc<dyn GrantStore>,
    tenants: Arc<dyn TenantDirectory>,
    users: Arc<dyn UserDirectory>,
}

impl RoleService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        grants: Arc<dyn GrantStore>,
        tenants: Arc<dyn TenantDirectory>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            roles,
            grants,
            tenants,
            users,
        }
    }

    pub async fn list_roles(
        &self,
        scope: Option<TenantId>,
        mut filter: RoleFilter,
        page: PageRequest,
    ) -> ServiceResult<Page<RoleView>> {
        if scope.is_some() {
            filter.tenant_id = scope;
        }

        let roles = self.roles.list_roles(&filter, page).await?;
        let mut data = Vec::with_capacity(roles.data.len());
        for role in roles.data {
            let user_count = self.users.count_users_with_role(role.id).await?;
            let mut view = self.view(role).await?;
            view.user_count = Some(user_count);
            data.push(view);
        }

        Ok(Page {
            data,
            page: roles.page,
            limit: roles.limit,
            total: roles.total,
            total_pages: roles.total_pages,
        })
    }

    pub async fn get_role(&self, id: RoleId, scope: Option<TenantId>) -> ServiceResult<RoleView> {
        let role = self.scoped_role(id, scope).await?;
        self.view(role).await
    }

    pub async fn create_role(&self, scope: Option<TenantId>, input: CreateRole) -> ServiceResult<RoleView> {
        let name = RoleName::parse(input.name)?;
        let permissions = match &input.permissions {
            Some(raw) => Some(parse_permission_set(raw)?),
            None => None,
        };

        let tenant_id = scope
            .or(input.tenant_id)
            .ok_or_else(|| AuthError::bad_request("operatorId is required"))?;

        let tenant = self
            .tenants
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| {
                AuthError::bad_request(format!("operator not found: operator {tenant_id} does not exist"))
            })?;
        if !tenant.active {
            return Err(
                AuthError::bad_request(format!("operator inactive: operator {tenant_id} is inactive")).into(),
            );
        }

        self.ensure_name_free(tenant_id, &name, None).await?;

        // Grants first: a failure here must not leave a role behind.
        let grant_ids = match &permissions {
            Some(permissions) => self.resolve_grants(permissions).await?,
            None => Vec::new(),
        };

        let role = self.roles.insert_role(tenant_id, &name).await.map_err(name_conflict(&name))?;
        if !grant_ids.is_empty() {
            if let Err(err) = self.grants.replace_role_grants(role.id, &grant_ids).await {
                if let Err(cleanup) = self.roles.delete_role(role.id).await {
                    warn!(role_id = %role.id, error = %cleanup, "failed to remove role after binding failure");
                }
                return Err(err.into());
            }
        }

        info!(role_id = %role.id, tenant_id = %tenant_id, name = %name, "role created");
        self.view(role).await
    }

    pub async fn update_role(&self, id: RoleId, scope: Option<TenantId>, input: UpdateRole) -> ServiceResult<RoleView> {
        let name = input.name.map(RoleName::parse).transpose()?;
        let permissions = match &input.permissions {
            Some(raw) => Some(parse_permission_set(raw)?),
            None => None,
        };

        let mut role = self.scoped_role(id, scope).await?;
        if let Some(name) = name.as_ref().filter(|n| n.as_str() != role.name) {
            self.ensure_name_free(role.tenant_id, name, Some(id)).await?;
        }

        let grant_ids = match &permissions {
            Some(permissions) => Some(self.resolve_grants(permissions).await?),
            None => None,
        };

        if let Some(name) = name.filter(|n| n.as_str() != role.name) {
            role = self.roles.rename_role(id, &name).await.map_err(name_conflict(&name))?;
        }

        if let Some(grant_ids) = grant_ids {
            self.replace_bindings(id, &grant_ids).await?;
        }

        self.view(role).await
    }

    /// Delete a role that no user is assigned to.
    pub async fn delete_role(&self, id: RoleId, scope: Option<TenantId>) -> ServiceResult<()> {
        let role = self.scoped_role(id, scope).await?;

        let assigned = self.users.count_users_with_role(role.id).await?;
        if assigned > 0 {
            return Err(AuthError::bad_request(format!(
                "role in use: cannot delete role with {assigned} assigned users; reassign them first"
            ))
            .into());
        }

        self.roles.delete_role(role.id).await?;
        info!(role_id = %role.id, tenant_id = %role.tenant_id, "role deleted");
        Ok(())
    }

    /// Replace the full set of grants bound to `role_id`.
    ///
    /// The list is validated as a whole before anything is written, so a
    /// malformed entry leaves the existing bindings untouched.
    pub async fn set_role_permissions(&self, role_id: RoleId, permissions: &[String]) -> ServiceResult<()> {
        let parsed = parse_permission_set(permissions)?;
        if self.roles.find_role(role_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("role {role_id}")));
        }
        self.bind(role_id, &parsed).await
    }

    pub async fn role_permissions(&self, role_id: RoleId) -> ServiceResult<Vec<Permission>> {
        Ok(self
            .grants
            .role_grants(role_id)
            .await?
            .iter()
            .map(GrantRecord::permission)
            .collect())
    }

    pub async fn list_grants(&self) -> ServiceResult<Vec<GrantRecord>> {
        Ok(self.grants.list_grants().await?)
    }

    async fn bind(&self, role_id: RoleId, permissions: &[Permission]) -> ServiceResult<()> {
        let ids = self.resolve_grants(permissions).await?;
        self.replace_bindings(role_id, &ids).await
    }

    /// Upsert every atom into the vocabulary; ids come back deduplicated.
    async fn resolve_grants(&self, permissions: &[Permission]) -> ServiceResult<Vec<GrantId>> {
        let mut seen = HashSet::new();
        let mut ids: Vec<GrantId> = Vec::with_capacity(permissions.len());
        for permission in permissions {
            let grant = self.grants.ensure_grant(permission).await?;
            if seen.insert(grant.id) {
                ids.push(grant.id);
            }
        }
        Ok(ids)
    }

    async fn replace_bindings(&self, role_id: RoleId, ids: &[GrantId]) -> ServiceResult<()> {
        self.grants.replace_role_grants(role_id, ids).await?;
        info!(role_id = %role_id, grant_count = ids.len(), "role permissions replaced");
        Ok(())
    }

    async fn scoped_role(&self, id: RoleId, scope: Option<TenantId>) -> ServiceResult<RoleRecord> {
        self.roles
            .find_role(id)
            .await?
            .filter(|r| scope.is_none_or(|t| r.tenant_id == t))
            .ok_or_else(|| ServiceError::not_found(format!("role {id}")))
    }

    async fn ensure_name_free(&self, tenant_id: TenantId, name: &RoleName, except: Option<RoleId>) -> ServiceResult<()> {
        let existing = self.roles.find_role_by_name(tenant_id, name.as_str()).await?;
        match existing {
            Some(role) if Some(role.id) != except => Err(duplicate_name(name).into()),
            _ => Ok(()),
        }
    }

    async fn view(&self, role: RoleRecord) -> ServiceResult<RoleView> {
        let operator = self
            .tenants
            .find_tenant(role.tenant_id)
            .await?
            .map(|t| OperatorRef { id: t.id, name: t.name });

        let mut permissions: Vec<String> = self
            .role_permissions(role.id)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect();
        permissions.sort();

        Ok(RoleView {
            role,
            operator,
            permissions,
            user_count: None,
        })
    }
}

fn duplicate_name(name: &RoleName) -> AuthError {
    AuthError::bad_request(format!(
        "duplicate role name: role with name \"{name}\" already exists for this operator"
    ))
}

/// A concurrent insert can still win the uniqueness race after the pre-check.
fn name_conflict(name: &RoleName) -> impl Fn(StoreError) -> ServiceError + '_ {
    move |err| match err {
        StoreError::Conflict(_) => duplicate_name(name).into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use haulbase_auth::MAX_ACTION_LEN;
    use haulbase_core::UserId;

    use super::*;
    use crate::store::{InMemoryStore, StoreResult, TenantRecord, UserRecord};

    /// Grant store over the in-memory backend whose writes can be made to fail.
    struct FlakyGrants {
        inner: Arc<InMemoryStore>,
        fail_upsert: AtomicBool,
        fail_replace: AtomicBool,
    }

    impl FlakyGrants {
        fn new(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                fail_upsert: AtomicBool::new(false),
                fail_replace: AtomicBool::new(false),
            }
        }
    }

    fn value_too_long() -> StoreError {
        StoreError::Backend("value too long for type character varying(50)".into())
    }

    #[async_trait]
    impl GrantStore for FlakyGrants {
        async fn ensure_grant(&self, permission: &Permission) -> StoreResult<GrantRecord> {
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(value_too_long());
            }
            self.inner.ensure_grant(permission).await
        }

        async fn list_grants(&self) -> StoreResult<Vec<GrantRecord>> {
            self.inner.list_grants().await
        }

        async fn role_grants(&self, role_id: RoleId) -> StoreResult<Vec<GrantRecord>> {
            self.inner.role_grants(role_id).await
        }

        async fn replace_role_grants(&self, role_id: RoleId, grant_ids: &[GrantId]) -> StoreResult<()> {
            if self.fail_replace.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".into()));
            }
            self.inner.replace_role_grants(role_id, grant_ids).await
        }

        async fn has_grant(&self, role_id: RoleId, permission: &Permission) -> StoreResult<bool> {
            self.inner.has_grant(role_id, permission).await
        }
    }

    fn flaky_service() -> (RoleService, Arc<FlakyGrants>, Arc<InMemoryStore>) {
        let (_, store) = service();
        let grants = Arc::new(FlakyGrants::new(store.clone()));
        let svc = RoleService::new(store.clone(), grants.clone(), store.clone(), store.clone());
        (svc, grants, store)
    }

    fn service() -> (RoleService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        for (id, active) in [(1, true), (2, true), (3, false)] {
            store
                .insert_tenant(TenantRecord {
                    id: TenantId::new(id),
                    name: format!("Carrier {id}"),
                    tax_id: None,
                    is_super_tenant: false,
                    expires_at: None,
                    active,
                })
                .unwrap();
        }
        let svc = RoleService::new(store.clone(), store.clone(), store.clone(), store.clone());
        (svc, store)
    }

    fn create(name: &str, permissions: &[&str]) -> CreateRole {
        CreateRole {
            name: name.to_string(),
            tenant_id: Some(TenantId::new(1)),
            permissions: Some(permissions.iter().map(|p| p.to_string()).collect()),
        }
    }

    fn bad_request(err: ServiceError) -> String {
        match err {
            ServiceError::Auth(AuthError::BadRequest(msg)) => msg,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_binds_initial_permissions() {
        let (svc, _) = service();
        let role = svc
            .create_role(None, create("Dispatcher", &["orders.read", "orders.update", "orders.read"]))
            .await
            .unwrap();

        assert_eq!(role.permissions, vec!["orders.read", "orders.update"]);
        assert_eq!(role.operator.as_ref().map(|o| o.name.as_str()), Some("Carrier 1"));
    }

    #[tokio::test]
    async fn malformed_entry_rejects_whole_list_without_writes() {
        let (svc, store) = service();
        let role = svc.create_role(None, create("Dispatcher", &["orders.read"])).await.unwrap();

        let err = svc
            .set_role_permissions(role.role.id, &["orders.delete".into(), "ordersdelete".into()])
            .await
            .unwrap_err();

        assert!(bad_request(err).contains("ordersdelete"));
        let held = svc.role_permissions(role.role.id).await.unwrap();
        assert_eq!(held, vec![Permission::new("orders", "read")]);
        assert_eq!(store.list_grants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replacement_is_total_and_empty_clears() {
        let (svc, _) = service();
        let role = svc
            .create_role(None, create("Dispatcher", &["orders.read", "orders.delete"]))
            .await
            .unwrap();
        let id = role.role.id;

        svc.set_role_permissions(id, &["fleet.read".into()]).await.unwrap();
        assert_eq!(svc.role_permissions(id).await.unwrap(), vec![Permission::new("fleet", "read")]);

        svc.set_role_permissions(id, &[]).await.unwrap();
        assert!(svc.role_permissions(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn grants_are_shared_across_tenants() {
        let (svc, store) = service();
        svc.create_role(None, create("A", &["orders.read"])).await.unwrap();
        let mut other = create("B", &["orders.read"]);
        other.tenant_id = Some(TenantId::new(2));
        svc.create_role(None, other).await.unwrap();

        assert_eq!(store.list_grants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn names_are_unique_per_tenant() {
        let (svc, _) = service();
        svc.create_role(None, create("Dispatcher", &[])).await.unwrap();

        let err = svc.create_role(None, create("Dispatcher", &[])).await.unwrap_err();
        assert!(bad_request(err).contains("already exists"));

        let mut other = create("Dispatcher", &[]);
        other.tenant_id = Some(TenantId::new(2));
        assert!(svc.create_role(None, other).await.is_ok());
    }

    #[tokio::test]
    async fn inactive_operator_is_rejected() {
        let (svc, _) = service();
        let mut input = create("Dispatcher", &[]);
        input.tenant_id = Some(TenantId::new(3));

        let err = svc.create_role(None, input).await.unwrap_err();
        assert!(bad_request(err).contains("inactive"));
    }

    #[tokio::test]
    async fn scoped_caller_cannot_see_other_tenant_roles() {
        let (svc, _) = service();
        let role = svc.create_role(None, create("Dispatcher", &[])).await.unwrap();

        let err = svc.get_role(role.role.id, Some(TenantId::new(2))).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let page = svc
            .list_roles(Some(TenantId::new(2)), RoleFilter::default(), PageRequest::new(None, None, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn update_renames_and_optionally_rebinds() {
        let (svc, _) = service();
        let role = svc.create_role(None, create("Dispatcher", &["orders.read"])).await.unwrap();
        svc.create_role(None, create("Auditor", &[])).await.unwrap();

        let err = svc
            .update_role(
                role.role.id,
                None,
                UpdateRole {
                    name: Some("Auditor".into()),
                    permissions: None,
                },
            )
            .await
            .unwrap_err();
        assert!(bad_request(err).contains("already exists"));

        let updated = svc
            .update_role(
                role.role.id,
                None,
                UpdateRole {
                    name: Some("Planner".into()),
                    permissions: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role.name, "Planner");
        assert_eq!(updated.permissions, vec!["orders.read"]);
    }

    #[tokio::test]
    async fn role_in_use_cannot_be_deleted() {
        let (svc, store) = service();
        let role = svc.create_role(None, create("Dispatcher", &["orders.read"])).await.unwrap();
        store
            .insert_user(UserRecord {
                id: UserId::new(1),
                username: "d".into(),
                email: "d@example.com".into(),
                first_name: String::new(),
                last_name: String::new(),
                tenant_id: TenantId::new(1),
                role_id: role.role.id,
                active: true,
                last_activity_at: None,
            })
            .unwrap();

        let err = svc.delete_role(role.role.id, None).await.unwrap_err();
        assert!(bad_request(err).contains("1 assigned users"));

        let unused = svc.create_role(None, create("Temp", &["orders.read"])).await.unwrap();
        svc.delete_role(unused.role.id, None).await.unwrap();
        assert!(matches!(
            svc.get_role(unused.role.id, None).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(svc.role_permissions(unused.role.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replacing_with_the_same_set_twice_is_idempotent() {
        let (svc, store) = service();
        let role = svc.create_role(None, create("Dispatcher", &[])).await.unwrap();
        let id = role.role.id;
        let wanted: Vec<String> = vec!["orders.read".into(), "orders.update".into()];

        svc.set_role_permissions(id, &wanted).await.unwrap();
        svc.set_role_permissions(id, &wanted).await.unwrap();

        let bound = store.role_grants(id).await.unwrap();
        assert_eq!(bound.len(), 2);
        let mut held: Vec<String> = bound.iter().map(|g| g.permission().to_string()).collect();
        held.sort();
        assert_eq!(held, wanted);
    }

    #[tokio::test]
    async fn over_long_permission_is_a_bad_request_and_creates_nothing() {
        let (svc, store) = service();
        let too_long = format!("orders.{}", "x".repeat(MAX_ACTION_LEN + 10));

        let err = svc
            .create_role(None, create("Dispatcher", &[too_long.as_str()]))
            .await
            .unwrap_err();

        assert!(bad_request(err).contains("invalid permission format"));
        assert!(store.find_role_by_name(TenantId::new(1), "Dispatcher").await.unwrap().is_none());
        assert!(store.list_grants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_grant_upsert_leaves_no_role_and_retry_succeeds() {
        let (svc, grants, store) = flaky_service();
        grants.fail_upsert.store(true, Ordering::SeqCst);

        let err = svc
            .create_role(None, create("Dispatcher", &["orders.read"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Backend(_))));
        assert!(store.find_role_by_name(TenantId::new(1), "Dispatcher").await.unwrap().is_none());

        grants.fail_upsert.store(false, Ordering::SeqCst);
        let role = svc.create_role(None, create("Dispatcher", &["orders.read"])).await.unwrap();
        assert_eq!(role.permissions, vec!["orders.read"]);
    }

    #[tokio::test]
    async fn failed_binding_removes_the_new_role() {
        let (svc, grants, store) = flaky_service();
        grants.fail_replace.store(true, Ordering::SeqCst);

        let err = svc
            .create_role(None, create("Dispatcher", &["orders.read"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Backend(_))));
        assert!(store.find_role_by_name(TenantId::new(1), "Dispatcher").await.unwrap().is_none());

        grants.fail_replace.store(false, Ordering::SeqCst);
        assert!(svc.create_role(None, create("Dispatcher", &["orders.read"])).await.is_ok());
    }

    #[tokio::test]
    async fn failed_grant_upsert_on_update_keeps_the_old_name() {
        let (svc, grants, store) = flaky_service();
        let role = svc.create_role(None, create("Dispatcher", &["orders.read"])).await.unwrap();
        grants.fail_upsert.store(true, Ordering::SeqCst);

        let err = svc
            .update_role(
                role.role.id,
                None,
                UpdateRole {
                    name: Some("Planner".into()),
                    permissions: Some(vec!["fleet.read".into()]),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Backend(_))));

        let stored = store.find_role(role.role.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Dispatcher");
        assert_eq!(svc.role_permissions(role.role.id).await.unwrap(), vec![Permission::new("orders", "read")]);
    }

    #[tokio::test]
    async fn rejections_carry_stable_error_names() {
        let (svc, store) = service();
        svc.create_role(None, create("Dispatcher", &[])).await.unwrap();

        let dup = svc.create_role(None, create("Dispatcher", &[])).await.unwrap_err();
        assert!(bad_request(dup).starts_with("duplicate role name"));

        let mut inactive = create("Dispatcher", &[]);
        inactive.tenant_id = Some(TenantId::new(3));
        let err = svc.create_role(None, inactive).await.unwrap_err();
        assert!(bad_request(err).starts_with("operator inactive"));

        let used = svc.create_role(None, create("Loader", &[])).await.unwrap();
        store
            .insert_user(UserRecord {
                id: UserId::new(7),
                username: "l".into(),
                email: "l@example.com".into(),
                first_name: String::new(),
                last_name: String::new(),
                tenant_id: TenantId::new(1),
                role_id: used.role.id,
                active: true,
                last_activity_at: None,
            })
            .unwrap();
        let err = svc.delete_role(used.role.id, None).await.unwrap_err();
        assert!(bad_request(err).starts_with("role in use"));
    }
}
