//! Authorization decision engine: the storage-backed half of a decision.

use std::sync::Arc;

use tracing::debug;

use haulbase_auth::{
    authorize, conclude, explain_authorization, AllowReason, AuthorizationExplanation, Caller, OperationRegistry,
    Permission, Verdict,
};

use crate::error::ServiceResult;
use crate::store::GrantStore;

#[derive(Clone)]
pub struct AuthorizationEngine {
    registry: Arc<OperationRegistry>,
    grants: Arc<dyn GrantStore>,
}

impl AuthorizationEngine {
    pub fn new(registry: Arc<OperationRegistry>, grants: Arc<dyn GrantStore>) -> Self {
        Self { registry, grants }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Decide whether `caller` may invoke the operation at `method route`.
    ///
    /// Operations absent from the registry are open to any caller.
    pub async fn check(&self, caller: Option<&Caller>, method: &str, route: &str) -> ServiceResult<AllowReason> {
        let required = self.registry.required(method, route);
        let outcome = self.check_permission(caller, required).await;
        if let Err(err) = &outcome {
            debug!(method, route, error = %err, "authorization denied");
        }
        outcome
    }

    pub async fn check_permission(
        &self,
        caller: Option<&Caller>,
        required: Option<&Permission>,
    ) -> ServiceResult<AllowReason> {
        match authorize(caller, required)? {
            Verdict::Allow(reason) => Ok(reason),
            Verdict::CheckBinding { role_id, permission } => {
                let bound = self.grants.has_grant(role_id, &permission).await?;
                Ok(conclude(&permission, bound)?)
            }
        }
    }

    /// Diagnostic account of the decision for `permission`.
    pub async fn explain(&self, caller: &Caller, permission: &Permission) -> ServiceResult<AuthorizationExplanation> {
        let held: Vec<Permission> = self
            .grants
            .role_grants(caller.role_id)
            .await?
            .iter()
            .map(|g| g.permission())
            .collect();
        Ok(explain_authorization(caller, permission, &held))
    }
}
