//! Authorization debugging: "why was this request denied?"

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use haulbase_auth::Permission;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/rbac/explain", get(explain_authorization_decision))
}

/// GET /rbac/explain?permission=orders.delete - explain the decision for the current caller
pub async fn explain_authorization_decision(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Query(query): Query<dto::ExplainQuery>,
) -> axum::response::Response {
    let permission = match Permission::parse(&query.permission) {
        Ok(p) => p,
        Err(e) => return errors::auth_error_to_response(&e),
    };

    match services.authz.explain(ctx.caller(), &permission).await {
        Ok(explanation) => (StatusCode::OK, Json(explanation)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
