use haulbase_auth::Caller;
use haulbase_core::TenantId;

/// Authenticated caller for a request.
///
/// Inserted by the authentication middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    caller: Caller,
}

impl CallerContext {
    pub fn new(caller: Caller) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn tenant_id(&self) -> TenantId {
        self.caller.tenant_id
    }

    /// `None` for super-tenant callers, who may act on any tenant.
    pub fn tenant_scope(&self) -> Option<TenantId> {
        self.caller.tenant_scope()
    }
}
