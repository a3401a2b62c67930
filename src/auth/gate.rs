//! Credential check and in-memory session store.

use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AuthError;

/// Opaque session identifier handed to the client in a cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        Self(format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Server-side proof of a successful login.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub created_at: SystemTime,
}

struct Credentials {
    username: String,
    password: String,
}

/// Validates the shared credential and tracks logged-in sessions.
///
/// Cheap to clone; clones share the same session store. Sessions live until
/// logout or until the process exits.
#[derive(Clone)]
pub struct SessionGate {
    credentials: Arc<Credentials>,
    sessions: Arc<DashMap<SessionToken, Session>>,
}

impl SessionGate {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Arc::new(Credentials {
                username: username.into(),
                password: password.into(),
            }),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Check credentials and open a session.
    ///
    /// Both fields are always compared, in constant time, and a mismatch in
    /// either yields the same error.
    pub fn login(&self, username: &str, password: &str) -> Result<SessionToken, AuthError> {
        let user_ok = username
            .as_bytes()
            .ct_eq(self.credentials.username.as_bytes());
        let pass_ok = password
            .as_bytes()
            .ct_eq(self.credentials.password.as_bytes());

        if !bool::from(user_ok & pass_ok) {
            warn!("Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        let token = SessionToken::generate();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                created_at: SystemTime::now(),
            },
        );

        info!(user = %username, "User logged in");
        Ok(token)
    }

    /// True if `token` belongs to a live session.
    pub fn authorize(&self, token: Option<&str>) -> bool {
        self.session(token).is_some()
    }

    pub fn session(&self, token: Option<&str>) -> Option<Session> {
        let token = token?;
        if token.is_empty() {
            return None;
        }
        self.sessions
            .get(&SessionToken(token.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Invalidate a session immediately. Returns false if it did not exist.
    pub fn logout(&self, token: &str) -> bool {
        let removed = self
            .sessions
            .remove(&SessionToken(token.to_string()))
            .is_some();
        if removed {
            debug!("Session closed");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SessionGate {
        SessionGate::new("admin", "123456")
    }

    #[test]
    fn test_authorize_without_login_fails() {
        let gate = gate();
        assert!(!gate.authorize(None));
        assert!(!gate.authorize(Some("")));
        assert!(!gate.authorize(Some("made-up-token")));
    }

    #[test]
    fn test_login_success_authorizes_token() {
        let gate = gate();
        let token = gate.login("admin", "123456").unwrap();

        assert!(gate.authorize(Some(token.as_str())));
        assert_eq!(gate.session(Some(token.as_str())).unwrap().username, "admin");
        assert_eq!(gate.active_sessions(), 1);
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let gate = gate();

        let wrong_password = gate.login("admin", "wrong").unwrap_err();
        let wrong_user = gate.login("root", "123456").unwrap_err();
        let both_wrong = gate.login("", "").unwrap_err();

        assert_eq!(wrong_password, AuthError::InvalidCredentials);
        assert_eq!(wrong_user, AuthError::InvalidCredentials);
        assert_eq!(both_wrong, AuthError::InvalidCredentials);
        assert_eq!(gate.active_sessions(), 0);
    }

    #[test]
    fn test_login_rejects_prefix_match() {
        let gate = gate();
        assert!(gate.login("admin", "12345").is_err());
        assert!(gate.login("admin", "1234567").is_err());
        assert!(gate.login("Admin", "123456").is_err());
    }

    #[test]
    fn test_logout_invalidates_immediately() {
        let gate = gate();
        let token = gate.login("admin", "123456").unwrap();
        let other = gate.login("admin", "123456").unwrap();
        assert_ne!(token, other);

        assert!(gate.logout(token.as_str()));
        assert!(!gate.authorize(Some(token.as_str())));
        assert!(gate.authorize(Some(other.as_str())));
        assert!(!gate.logout(token.as_str()));
    }

    #[test]
    fn test_clones_share_sessions() {
        let gate = gate();
        let clone = gate.clone();
        let token = gate.login("admin", "123456").unwrap();
        assert!(clone.authorize(Some(token.as_str())));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = gate().login("admin", "123456").unwrap();
        let debug = format!("{:?}", token);
        assert!(!debug.contains(token.as_str()));
    }
}
