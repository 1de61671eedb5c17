use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::Error;

/// Reserved claim keys written by the toolkit itself.
pub mod claim {
    pub const SESSION_ID: &str = "___id";
    pub const SESSION_MODE: &str = "___sm";
    pub const RBAC_CACHE_ID: &str = "___ri";
    pub const CSRF_TIE: &str = "___ct";
    pub const VERSION: &str = "___v";
}

/// String claims carried inside a session token.
///
/// `has_session` is never part of the encoded payload. It only becomes
/// `true` once a token carrying these claims has been decrypted and checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionClaims {
    claims: BTreeMap<String, String>,
    has_session: bool,
}

impl SessionClaims {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether these claims belong to an authenticated session.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.has_session
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.has_session = true;
    }

    #[must_use]
    pub fn has_claim(&self, key: &str) -> bool {
        self.claims.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.claims.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.claims.insert(key.into(), value.into());
    }

    /// Sets `key` only if it has no value yet. Returns whether it was set.
    pub fn set_if_not_set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.claims.contains_key(&key) {
            return false;
        }
        self.claims.insert(key, value.into());
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.claims.remove(key)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.claims.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.non_empty(claim::SESSION_ID)
    }

    #[must_use]
    pub fn session_mode(&self) -> Option<&str> {
        self.non_empty(claim::SESSION_MODE)
    }

    #[must_use]
    pub fn csrf_tie(&self) -> Option<&str> {
        self.non_empty(claim::CSRF_TIE)
    }

    #[must_use]
    pub fn rbac_cache_id(&self) -> Option<&str> {
        self.non_empty(claim::RBAC_CACHE_ID)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.non_empty(claim::VERSION)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Encodes the claim map as base64url JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if serialization fails.
    pub fn encode_payload(&self) -> Result<String, Error> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.claims)?))
    }

    /// Decodes a payload produced by [`encode_payload`](Self::encode_payload).
    ///
    /// The result is not authenticated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] for invalid base64 or JSON.
    pub fn decode_payload(payload: &str) -> Result<Self, Error> {
        let json = URL_SAFE_NO_PAD.decode(payload)?;
        Ok(Self {
            claims: serde_json::from_slice(&json)?,
            has_session: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_if_not_set() {
        let mut claims = SessionClaims::new();
        assert!(claims.set_if_not_set("a", "1"));
        assert!(!claims.set_if_not_set("a", "2"));
        assert_eq!(claims.get("a"), Some("1"));

        claims.set("a", "3");
        assert_eq!(claims.get("a"), Some("3"));
    }

    #[test]
    fn test_payload_round_trip_is_unauthenticated() {
        let mut claims = SessionClaims::new()
            .with(claim::SESSION_MODE, "user")
            .with("email", "a@b.c");
        claims.mark_authenticated();

        let decoded = SessionClaims::decode_payload(&claims.encode_payload().unwrap()).unwrap();
        assert!(!decoded.has_session());
        assert_eq!(decoded.session_mode(), Some("user"));
        assert_eq!(decoded.get("email"), Some("a@b.c"));
    }

    #[test]
    fn test_has_session_not_encoded() {
        let mut claims = SessionClaims::new();
        claims.mark_authenticated();
        let json = URL_SAFE_NO_PAD.decode(claims.encode_payload().unwrap()).unwrap();
        assert_eq!(json, b"{}");
    }

    #[test]
    fn test_empty_reserved_claims_are_absent() {
        let claims = SessionClaims::new().with(claim::CSRF_TIE, "");
        assert!(claims.has_claim(claim::CSRF_TIE));
        assert_eq!(claims.csrf_tie(), None);
    }

    #[test]
    fn test_decode_rejects_non_string_values() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"a":1}"#);
        assert!(SessionClaims::decode_payload(&payload).is_err());
    }
}
