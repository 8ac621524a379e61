//! Inactivity-based session validity.
//!
//! A credential can be technically valid (signature, `exp`) while the session
//! it represents has lapsed: once a user has been idle longer than the
//! inactivity timeout, the next request is refused and a new login is needed.
//! Expiry is evaluated lazily here, at authentication time.

use chrono::{DateTime, Duration, Utc};

use crate::{AuthError, UnauthorizedReason};

/// Default idle window before a session lapses.
pub const INACTIVITY_TIMEOUT_MINUTES: i64 = 30;

/// The slice of a stored user the authenticator re-reads per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSessionState {
    pub active: bool,
    /// `None` until the first authenticated request.
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    inactivity_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(INACTIVITY_TIMEOUT_MINUTES))
    }
}

impl SessionPolicy {
    pub fn new(inactivity_timeout: Duration) -> Self {
        Self { inactivity_timeout }
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout
    }

    /// Check a looked-up user against the policy.
    ///
    /// Order matters: missing user, then inactive account, then idle timeout.
    pub fn check(&self, state: Option<&UserSessionState>, now: DateTime<Utc>) -> Result<(), AuthError> {
        let state = state.ok_or(AuthError::Unauthorized(UnauthorizedReason::UserNotFound))?;

        if !state.active {
            return Err(AuthError::Unauthorized(UnauthorizedReason::AccountInactive));
        }

        if let Some(last) = state.last_activity_at {
            if now - last > self.inactivity_timeout {
                return Err(AuthError::Unauthorized(UnauthorizedReason::InactivityExpired));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(last: Option<DateTime<Utc>>) -> UserSessionState {
        UserSessionState {
            active: true,
            last_activity_at: last,
        }
    }

    #[test]
    fn idle_past_timeout_expires() {
        let now = Utc::now();
        let err = SessionPolicy::default()
            .check(Some(&active(Some(now - Duration::minutes(31)))), now)
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthorized(UnauthorizedReason::InactivityExpired));
    }

    #[test]
    fn idle_within_timeout_passes() {
        let now = Utc::now();
        assert!(SessionPolicy::default()
            .check(Some(&active(Some(now - Duration::minutes(29)))), now)
            .is_ok());
    }

    #[test]
    fn exactly_at_timeout_still_passes() {
        let now = Utc::now();
        assert!(SessionPolicy::default()
            .check(Some(&active(Some(now - Duration::minutes(30)))), now)
            .is_ok());
    }

    #[test]
    fn first_login_never_expires_by_inactivity() {
        assert!(SessionPolicy::default().check(Some(&active(None)), Utc::now()).is_ok());
    }

    #[test]
    fn missing_and_inactive_users_are_rejected_first() {
        let policy = SessionPolicy::default();
        let now = Utc::now();

        assert_eq!(
            policy.check(None, now).unwrap_err(),
            AuthError::Unauthorized(UnauthorizedReason::UserNotFound)
        );

        let stale_and_inactive = UserSessionState {
            active: false,
            last_activity_at: Some(now - Duration::hours(3)),
        };
        assert_eq!(
            policy.check(Some(&stale_and_inactive), now).unwrap_err(),
            AuthError::Unauthorized(UnauthorizedReason::AccountInactive)
        );
    }
}
