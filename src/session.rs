//! Signed session cookie registry for the test and debug surface.
//!
//! Integration tests of relying services drive login flows without a browser. To let
//! them impersonate a logged-in user, the server keeps the most recent session id per
//! user and exposes it as a ready-to-send cookie value, signed with the shared session
//! secret in the `s:<value>.<signature>` layout the cookie middleware verifies.
//!
//! This module must never be compiled into a production build, which is why it sits
//! behind the `debug-sessions` cargo feature.
use std::collections::HashMap;

use hmac::{Hmac, Mac};
use log::debug;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Failures when looking up a session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The user has no recorded session.
    NoSession,

    /// Something went wrong with the registry itself.
    PrimitiveError,
}

/// Remembers the latest session id per user and serves it as a signed cookie value.
pub struct SessionRegistry {
    secret: String,
    sessions: HashMap<String, String>,
}

impl SessionRegistry {
    /// Create an empty registry signing with the given shared secret.
    pub fn new(secret: impl Into<String>) -> SessionRegistry {
        SessionRegistry {
            secret: secret.into(),
            sessions: HashMap::new(),
        }
    }

    /// Record the session id of a fresh login, replacing any earlier one.
    pub fn record(&mut self, user_id: impl Into<String>, session_id: impl Into<String>) {
        let user_id = user_id.into();
        debug!("recording session for user {}", user_id);
        self.sessions.insert(user_id, session_id.into());
    }

    /// Retrieve the signed cookie value of the user's latest session.
    pub fn lookup(&self, user_id: &str) -> Result<String, SessionError> {
        let session_id = self.sessions.get(user_id).ok_or(SessionError::NoSession)?;
        self.sign(session_id)
    }

    /// Sign a raw cookie value.
    ///
    /// The signature is the base64 encoded HMAC-SHA256 of the value under the session
    /// secret, with the padding stripped, prefixed by `s:` on the value.
    pub fn sign(&self, value: &str) -> Result<String, SessionError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SessionError::PrimitiveError)?;
        mac.update(value.as_bytes());

        let signature = base64::encode(mac.finalize().into_bytes());
        let signature = signature.trim_end_matches('=');
        Ok(format!("s:{}.{}", value, signature))
    }

    /// Check a signed cookie value and return the raw value on success.
    pub fn unsign(&self, cookie: &str) -> Option<String> {
        let rest = cookie.strip_prefix("s:")?;
        let dot = rest.rfind('.')?;
        let value = &rest[..dot];

        // Re-signing and comparing keeps the check in one place.
        match self.sign(value) {
            Ok(expected) if expected == cookie => Some(value.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_cookie_round_trip() {
        let registry = SessionRegistry::new("o2r");
        let cookie = registry.sign("AbCdEf123456").unwrap();

        assert!(cookie.starts_with("s:AbCdEf123456."));
        assert!(!cookie.ends_with('='));
        assert_eq!(registry.unsign(&cookie), Some("AbCdEf123456".to_string()));
    }

    #[test]
    fn tampered_cookie_rejected() {
        let registry = SessionRegistry::new("o2r");
        let cookie = registry.sign("AbCdEf123456").unwrap();
        let tampered = cookie.replace("AbCdEf", "ZzZzZz");

        assert_eq!(registry.unsign(&tampered), None);

        let wrong_secret = SessionRegistry::new("not-o2r");
        assert_eq!(wrong_secret.unsign(&cookie), None);
    }

    #[test]
    fn latest_session_wins() {
        let mut registry = SessionRegistry::new("o2r");
        registry.record("1", "first-session");
        registry.record("1", "second-session");

        let cookie = registry.lookup("1").unwrap();
        assert!(cookie.starts_with("s:second-session."));
    }

    #[test]
    fn missing_session_reported() {
        let registry = SessionRegistry::new("o2r");
        assert_eq!(registry.lookup("1"), Err(SessionError::NoSession));
    }
}
