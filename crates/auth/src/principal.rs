use serde::{Deserialize, Serialize};

use haulbase_core::{RoleId, TenantId, UserId};

use crate::claims::CredentialClaims;

/// The authenticated identity resolved from a request's credential.
///
/// Built from the verified claims, not from storage: role, tenant and the
/// super-tenant flag reflect the state at credential issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub is_super_tenant: bool,
    pub username: String,
    pub email: String,
}

impl Caller {
    /// Tenant filter to apply to tenant-scoped queries issued by this caller.
    ///
    /// Super-tenant callers see every tenant (`None`).
    pub fn tenant_scope(&self) -> Option<TenantId> {
        if self.is_super_tenant {
            None
        } else {
            Some(self.tenant_id)
        }
    }
}

impl From<CredentialClaims> for Caller {
    fn from(claims: CredentialClaims) -> Self {
        Self {
            id: claims.sub,
            tenant_id: claims.operator_id,
            role_id: claims.role_id,
            is_super_tenant: claims.is_super,
            username: claims.username,
            email: claims.email,
        }
    }
}
