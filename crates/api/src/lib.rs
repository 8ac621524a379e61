//! HTTP API: configuration, middleware, routing and request/response mapping.

pub mod app;
pub mod audit;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
