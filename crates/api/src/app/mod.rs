//! HTTP application wiring.
//!
//! - `services.rs`: storage backends and the request-facing services
//! - `routes/`: handlers and permission declarations, one file per area
//! - `dto.rs`: query-string DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use haulbase_auth::RegistryError;
use haulbase_infra::audit::AuditWorkerHandle;

use crate::{audit, authz, middleware};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, ServiceSettings, Stores};

/// A built application: the router plus the handles needed to shut it down.
pub struct App {
    pub router: Router,
    pub services: Arc<AppServices>,
    pub audit_worker: AuditWorkerHandle,
}

/// Build the full HTTP router and start the audit worker.
///
/// Protected routes pass through, outermost first: authentication, the
/// permission guard, audit capture, then the handler.
pub fn build_app(stores: Stores, settings: &ServiceSettings) -> Result<App, RegistryError> {
    let registry = routes::registry()?;
    tracing::debug!(operations = registry.len(), "operation registry built");

    let (services, audit_worker) = AppServices::build(stores, settings, registry);
    let services = Arc::new(services);

    let protected = routes::router()
        .route_layer(axum::middleware::from_fn(audit::audit_middleware))
        .route_layer(axum::middleware::from_fn(authz::authz_middleware))
        .route_layer(axum::middleware::from_fn(middleware::auth_middleware));

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services.clone())));

    Ok(App {
        router,
        services,
        audit_worker,
    })
}
