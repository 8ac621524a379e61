//! Audit capture.
//!
//! Innermost route layer: only requests that passed authentication and
//! authorization reach it. The request body and the handler's response are
//! buffered, captured into an [`AuditJob`] and handed to the background
//! recorder; the response itself is returned unchanged.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Extension},
    http::{header::USER_AGENT, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use haulbase_infra::audit::{is_excluded, AuditActor, AuditJob, AuditOutcome};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;

/// Matches axum's default request body limit.
const MAX_CAPTURED_BODY: usize = 2 * 1024 * 1024;

pub async fn audit_middleware(
    Extension(services): Extension<Arc<AppServices>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(caller) = req.extensions().get::<CallerContext>().cloned() else {
        return next.run(req).await;
    };

    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    if is_excluded(&url) {
        return next.run(req).await;
    }

    let method = req.method().as_str().to_owned();
    let ip_address = client_ip(&req);
    let user_agent = header_str(req.headers(), USER_AGENT.as_str());

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_CAPTURED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => return errors::json_error(StatusCode::PAYLOAD_TOO_LARGE, "body_rejected", e.to_string()),
    };
    let body = parse_json(&body_bytes);
    let req = Request::from_parts(parts, Body::from(body_bytes));

    let response = next.run(req).await;

    let (parts, body_stream) = response.into_parts();
    let response_bytes = match axum::body::to_bytes(body_stream, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(target: "audit", error = %e, url = %url, "response body unreadable; audit skipped");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let payload = parse_json(&response_bytes);
    let outcome = if parts.status.is_client_error() || parts.status.is_server_error() {
        let message = payload
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| parts.status.canonical_reason().unwrap_or("error").to_owned());
        AuditOutcome::Failure { message }
    } else {
        AuditOutcome::Success(payload)
    };

    services.audit.record(AuditJob {
        actor: AuditActor {
            user_id: caller.caller().id,
            tenant_id: caller.tenant_id(),
        },
        method,
        url,
        body,
        outcome,
        ip_address,
        user_agent,
    });

    Response::from_parts(parts, Body::from(response_bytes))
}

fn parse_json(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(req: &Request<Body>) -> Option<String> {
    header_str(req.headers(), "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_owned()))
        .filter(|s| !s.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}
