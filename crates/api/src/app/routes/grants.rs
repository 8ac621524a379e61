use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use haulbase_auth::{OperationRegistry, Permission, RegistryError};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/grants", get(list_grants))
}

pub fn declare(registry: &mut OperationRegistry) -> Result<(), RegistryError> {
    registry.declare("GET", "/grants", Permission::new("roles", "read"))?;
    Ok(())
}

/// GET /grants - the platform-wide permission vocabulary
pub async fn list_grants(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.roles.list_grants().await {
        Ok(grants) => {
            let data: Vec<_> = grants
                .iter()
                .map(|g| {
                    json!({
                        "id": g.id,
                        "resource": g.resource,
                        "action": g.action,
                        "permission": g.permission().to_string(),
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({ "data": data }))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
