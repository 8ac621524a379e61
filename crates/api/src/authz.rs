//! Permission guard.
//!
//! Runs after authentication and before any handler: looks up the permission
//! the matched operation declares and asks the decision engine.

use std::sync::Arc;

use axum::{
    extract::{Extension, MatchedPath},
    middleware::Next,
    response::Response,
};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub async fn authz_middleware(
    Extension(services): Extension<Arc<AppServices>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_default();
    let caller = req.extensions().get::<CallerContext>().map(|c| c.caller().clone());

    if let Err(e) = services
        .authz
        .check(caller.as_ref(), req.method().as_str(), &route)
        .await
    {
        return errors::service_error_to_response(e);
    }

    next.run(req).await
}
