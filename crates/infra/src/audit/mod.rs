//! Audit recorder: derivation, asynchronous write path and query surface.

pub mod entry;
pub mod worker;

use std::sync::Arc;

use haulbase_core::{AuditRecordId, Page, PageRequest, TenantId, UserId};

pub use entry::{is_excluded, AuditActor, AuditJob, AuditOutcome};
pub use worker::{AuditRecorder, AuditStats, AuditWorker, AuditWorkerHandle, DEFAULT_QUEUE_CAPACITY};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{AuditFilter, AuditRecordView, AuditStore};

pub const DEFAULT_AUDIT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 20;

/// Read side of the audit log.
///
/// `scope` confines tenant-scoped callers to their own tenant's records.
#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn AuditStore>,
}

impl AuditQueryService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        scope: Option<TenantId>,
        mut filter: AuditFilter,
        page: PageRequest,
    ) -> ServiceResult<Page<AuditRecordView>> {
        if scope.is_some() {
            filter.tenant_id = scope;
        }
        Ok(self.store.query(&filter, page).await?)
    }

    pub async fn get(&self, id: AuditRecordId, scope: Option<TenantId>) -> ServiceResult<AuditRecordView> {
        self.store
            .find(id)
            .await?
            .filter(|v| scope.is_none_or(|t| v.record.tenant_id == t))
            .ok_or_else(|| ServiceError::not_found(format!("audit record {id}")))
    }

    pub async fn user_activity(
        &self,
        user_id: UserId,
        scope: Option<TenantId>,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<AuditRecordView>> {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .min(PageRequest::MAX_LIMIT);
        let mut records = self.store.user_activity(user_id, limit).await?;
        if let Some(tenant) = scope {
            records.retain(|v| v.record.tenant_id == tenant);
        }
        Ok(records)
    }
}
