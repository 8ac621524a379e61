use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use haulbase_auth::{OperationRegistry, Permission, RegistryError};
use haulbase_core::{AuditRecordId, UserId};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/audit", get(list_audit_records))
        .route("/audit/:id", get(get_audit_record))
        .route("/audit/users/:id/activity", get(user_activity))
}

pub fn declare(registry: &mut OperationRegistry) -> Result<(), RegistryError> {
    registry
        .declare("GET", "/audit", Permission::new("audit", "read"))?
        .declare("GET", "/audit/:id", Permission::new("audit", "read"))?
        .declare("GET", "/audit/users/:id/activity", Permission::new("audit", "read"))?;
    Ok(())
}

pub async fn list_audit_records(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Query(query): Query<dto::AuditListQuery>,
) -> axum::response::Response {
    match services
        .audit_log
        .list(ctx.tenant_scope(), query.filter(), query.page())
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_audit_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AuditRecordId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.audit_log.get(id, ctx.tenant_scope()).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn user_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::ActivityQuery>,
) -> axum::response::Response {
    let user_id: UserId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .audit_log
        .user_activity(user_id, ctx.tenant_scope(), query.limit)
        .await
    {
        Ok(records) => (StatusCode::OK, Json(json!({ "data": records }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
