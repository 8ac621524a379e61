use std::sync::Arc;

use axum::{
    extract::Extension,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use haulbase_auth::{AuthError, UnauthorizedReason};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;

/// Resolve the bearer credential into a [`CallerContext`] or reject with 401.
pub async fn auth_middleware(
    Extension(services): Extension<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(e) => return errors::auth_error_to_response(&e),
    };

    let caller = match services.authenticator.authenticate(token, Utc::now()).await {
        Ok(caller) => caller,
        Err(e) => return errors::service_error_to_response(e),
    };

    req.extensions_mut().insert(CallerContext::new(caller));

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let missing = || AuthError::Unauthorized(UnauthorizedReason::MissingCredential);

    let header = headers.get(axum::http::header::AUTHORIZATION).ok_or_else(missing)?;
    let header = header.to_str().map_err(|_| missing())?;
    let (scheme, token) = header.trim_start().split_once(' ').ok_or_else(missing)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(missing());
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(missing());
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        for value in ["bearer abc.def.ghi", "BEARER abc.def.ghi", "BeArEr  abc.def.ghi"] {
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(extract_bearer(&headers).unwrap(), "abc.def.ghi", "{value}");
        }

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearerabc.def.ghi"));
        assert!(extract_bearer(&headers).is_err());
    }
}
