use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use haulbase_auth::{OperationRegistry, Permission, RegistryError};
use haulbase_core::RoleId;
use haulbase_infra::{CreateRole, UpdateRole};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route(
            "/roles/:id",
            get(get_role).put(update_role).patch(update_role).delete(delete_role),
        )
}

pub fn declare(registry: &mut OperationRegistry) -> Result<(), RegistryError> {
    registry
        .declare("GET", "/roles", Permission::new("roles", "read"))?
        .declare("GET", "/roles/:id", Permission::new("roles", "read"))?
        .declare("POST", "/roles", Permission::new("roles", "create"))?
        .declare("PUT", "/roles/:id", Permission::new("roles", "update"))?
        .declare("PATCH", "/roles/:id", Permission::new("roles", "update"))?
        .declare("DELETE", "/roles/:id", Permission::new("roles", "delete"))?;
    Ok(())
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Query(query): Query<dto::RoleListQuery>,
) -> axum::response::Response {
    match services
        .roles
        .list_roles(ctx.tenant_scope(), query.filter(), query.page())
        .await
    {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.get_role(id, ctx.tenant_scope()).await {
        Ok(role) => (StatusCode::OK, Json(role)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Json(body): Json<CreateRole>,
) -> axum::response::Response {
    match services.roles.create_role(ctx.tenant_scope(), body).await {
        Ok(role) => (StatusCode::CREATED, Json(role)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT and PATCH share semantics: absent fields are left untouched.
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateRole>,
) -> axum::response::Response {
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.update_role(id, ctx.tenant_scope(), body).await {
        Ok(role) => (StatusCode::OK, Json(role)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.roles.delete_role(id, ctx.tenant_scope()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
