use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/auth/refresh", post(refresh))
}

/// POST /auth/refresh - issue a new credential from the caller's current stored identity
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    match services.credentials.reissue(ctx.caller(), Utc::now()).await {
        Ok(credential) => (StatusCode::OK, Json(credential)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
