use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Storage width of `grants.resource`.
pub const MAX_RESOURCE_LEN: usize = 100;
/// Storage width of `grants.action`.
pub const MAX_ACTION_LEN: usize = 50;

/// A `(resource, action)` permission atom, e.g. `orders.read`.
///
/// Atoms form a platform-wide vocabulary shared by every tenant; only the
/// bindings of roles to atoms are tenant scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    resource: Cow<'static, str>,
    action: Cow<'static, str>,
}

impl Permission {
    pub fn new(resource: impl Into<Cow<'static, str>>, action: impl Into<Cow<'static, str>>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Parse the `resource.action` wire form.
    ///
    /// The string is split at the first `.`; both halves must be non-empty,
    /// fit their storage columns, and the action may not contain another `.`.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let invalid = || {
            AuthError::bad_request(format!(
                "invalid permission format: {raw}. Expected \"resource.action\""
            ))
        };

        let (resource, action) = raw.split_once('.').ok_or_else(invalid)?;
        if resource.is_empty() || action.is_empty() || action.contains('.') {
            return Err(invalid());
        }
        if resource.chars().count() > MAX_RESOURCE_LEN || action.chars().count() > MAX_ACTION_LEN {
            return Err(invalid());
        }

        Ok(Self::new(resource.to_string(), action.to_string()))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

impl core::str::FromStr for Permission {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a full replacement list, rejecting it as a whole on the first
/// malformed entry. Duplicates collapse; first occurrence order is kept.
pub fn parse_permission_set<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Permission>, AuthError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for entry in raw {
        let permission = Permission::parse(entry.as_ref())?;
        if seen.insert(permission.clone()) {
            out.push(permission);
        }
    }

    Ok(out)
}
