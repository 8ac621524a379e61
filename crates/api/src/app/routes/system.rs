use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::context::CallerContext;

/// Authenticated system endpoints. `/health` is mounted outside the auth layers.
pub fn router() -> Router {
    Router::new().route("/whoami", get(whoami))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<CallerContext>) -> impl IntoResponse {
    Json(ctx.caller().clone())
}
