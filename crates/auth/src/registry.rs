//! Registry of protected operations.
//!
//! Each protected operation declares exactly one `(resource, action)` pair.
//! Route modules register their declarations next to their routers at
//! startup; the permission guard looks the invoked operation up by id.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::Permission;

/// Operation identifier: `"<METHOD> <route template>"`, e.g. `"DELETE /roles/:id"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(method: &str, route: &str) -> Self {
        Self(format!("{} {}", method.to_ascii_uppercase(), route))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OperationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("operation '{0}' already declares a permission")]
    Duplicate(OperationId),
}

#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    declarations: HashMap<OperationId, Permission>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the permission an operation requires.
    pub fn declare(
        &mut self,
        method: &str,
        route: &str,
        permission: Permission,
    ) -> Result<&mut Self, RegistryError> {
        let id = OperationId::new(method, route);
        if self.declarations.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.declarations.insert(id, permission);
        Ok(self)
    }

    /// Permission required by an operation; `None` means any authenticated caller.
    pub fn required(&self, method: &str, route: &str) -> Option<&Permission> {
        self.declarations.get(&OperationId::new(method, route))
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Declarations ordered by operation id.
    pub fn declarations(&self) -> Vec<(&OperationId, &Permission)> {
        let mut all: Vec<_> = self.declarations.iter().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }
}
