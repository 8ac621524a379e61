use serde::Serialize;

use haulbase_core::{RoleId, TenantId, UserId};

use crate::{AuthError, Caller, ForbiddenReason, Permission};

/// Why a request was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// The operation declares no permission.
    Undeclared,
    /// The caller's tenant bypasses authorization.
    SuperTenant,
    /// The caller's role is bound to the required grant.
    RoleBinding,
}

/// Outcome of the storage-free part of a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow(AllowReason),
    /// Allowed iff a binding exists for `(role_id, permission)`.
    CheckBinding { role_id: RoleId, permission: Permission },
}

/// Decide as far as possible without touching storage.
///
/// - No IO
/// - No panics
pub fn authorize(caller: Option<&Caller>, required: Option<&Permission>) -> Result<Verdict, AuthError> {
    let Some(permission) = required else {
        return Ok(Verdict::Allow(AllowReason::Undeclared));
    };

    let caller = caller.ok_or(AuthError::Forbidden(ForbiddenReason::NotAuthenticated))?;

    if caller.is_super_tenant {
        return Ok(Verdict::Allow(AllowReason::SuperTenant));
    }

    Ok(Verdict::CheckBinding {
        role_id: caller.role_id,
        permission: permission.clone(),
    })
}

/// Finish a [`Verdict::CheckBinding`] once the binding lookup has run.
pub fn conclude(permission: &Permission, binding_exists: bool) -> Result<AllowReason, AuthError> {
    if binding_exists {
        Ok(AllowReason::RoleBinding)
    } else {
        Err(AuthError::missing_permission(permission.resource(), permission.action()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable account of a decision, for operator diagnosis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub caller: CallerState,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerState {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub is_super_tenant: bool,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Explain the decision for `required`, given the caller's role permissions.
pub fn explain_authorization(
    caller: &Caller,
    required: &Permission,
    role_permissions: &[Permission],
) -> AuthorizationExplanation {
    let mut effective: Vec<String> = role_permissions.iter().map(ToString::to_string).collect();
    effective.sort();
    effective.dedup();

    let state = CallerState {
        user_id: caller.id,
        tenant_id: caller.tenant_id,
        role_id: caller.role_id,
        is_super_tenant: caller.is_super_tenant,
        effective_permissions: effective,
    };

    let required_str = required.to_string();

    if caller.is_super_tenant {
        return AuthorizationExplanation {
            required_permission: required_str,
            granted: true,
            reason: format!("Tenant {} is a super-tenant and bypasses permission checks", caller.tenant_id),
            caller: state,
            denial_reason: None,
        };
    }

    if role_permissions.contains(required) {
        return AuthorizationExplanation {
            reason: format!("Role {} is bound to '{}'", caller.role_id, required_str),
            required_permission: required_str,
            granted: true,
            caller: state,
            denial_reason: None,
        };
    }

    AuthorizationExplanation {
        reason: format!(
            "Role {} is not bound to '{}'. Current permissions: {:?}",
            caller.role_id, required_str, state.effective_permissions
        ),
        denial_reason: Some(DenialReason {
            message: format!("missing permission {}:{}", required.resource(), required.action()),
            suggestions: vec![
                format!("Add '{}' to role {}", required_str, caller.role_id),
                "Request a new credential after the role changes (POST /auth/refresh)".to_string(),
            ],
        }),
        required_permission: required_str,
        granted: false,
        caller: state,
    }
}
