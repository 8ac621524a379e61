use chrono::{DateTime, Utc};
use serde::Deserialize;

use haulbase_core::{PageRequest, TenantId, UserId};
use haulbase_infra::audit::DEFAULT_AUDIT_PAGE_SIZE;
use haulbase_infra::store::{AuditFilter, RoleFilter};

pub const DEFAULT_ROLE_PAGE_SIZE: u32 = 10;

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleListQuery {
    pub operator_id: Option<TenantId>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl RoleListQuery {
    pub fn filter(&self) -> RoleFilter {
        RoleFilter {
            tenant_id: self.operator_id,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, DEFAULT_ROLE_PAGE_SIZE)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListQuery {
    pub user_id: Option<UserId>,
    pub operator_id: Option<TenantId>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AuditListQuery {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            user_id: self.user_id,
            tenant_id: self.operator_id,
            action: self.action.clone(),
            resource: self.resource.clone(),
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, DEFAULT_AUDIT_PAGE_SIZE)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}
