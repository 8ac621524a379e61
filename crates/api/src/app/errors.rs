use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use haulbase_auth::AuthError;
use haulbase_infra::ServiceError;
use haulbase_infra::store::StoreError;

pub fn auth_error_to_response(err: &AuthError) -> axum::response::Response {
    match err {
        AuthError::Unauthorized(reason) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", reason.to_string()),
        AuthError::Forbidden(reason) => json_error(StatusCode::FORBIDDEN, "forbidden", reason.to_string()),
        AuthError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
    }
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Auth(e) => auth_error_to_response(&e),
        ServiceError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        ServiceError::Store(StoreError::NotFound(msg)) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ServiceError::Store(StoreError::Conflict(msg)) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(e @ StoreError::Backend(_)) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage unavailable")
        }
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a positive numeric path id.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
