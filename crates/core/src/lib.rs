//! `haulbase-core` — shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod page;

pub use error::{DomainError, DomainResult};
pub use id::{AuditRecordId, GrantId, RoleId, TenantId, UserId};
pub use page::{Page, PageRequest};
