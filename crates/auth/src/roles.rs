use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Validated role name.
///
/// Uniqueness is scoped per tenant and enforced by the role service; this
/// type only guards the shape of the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    pub const MAX_LEN: usize = 100;

    pub fn parse(raw: impl Into<String>) -> Result<Self, AuthError> {
        let name = raw.into().trim().to_string();
        if name.is_empty() {
            return Err(AuthError::bad_request("role name must not be empty"));
        }
        if name.chars().count() > Self::MAX_LEN {
            return Err(AuthError::bad_request(format!(
                "role name must be at most {} characters",
                Self::MAX_LEN
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_validates() {
        assert_eq!(RoleName::parse("  Dispatcher ").unwrap().as_str(), "Dispatcher");
        assert!(RoleName::parse("   ").is_err());
        assert!(RoleName::parse("x".repeat(101)).is_err());
    }
}
