//! Double-submit CSRF tokens, optionally tied to one session.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::Error;
use crate::keys::KeyStore;
use crate::session::{SessionClaims, now_unix, secs};
use crate::token::{self, TokenFormat};

/// Default length of the random token value.
pub const DEFAULT_TOKEN_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfHeader {
    pub expires_at: i64,
    pub refresh_at: i64,
}

impl CsrfHeader {
    #[must_use]
    pub fn new(expiration: Duration, refresh: Duration) -> Self {
        Self::new_at(now_unix(), expiration, refresh)
    }

    #[must_use]
    pub fn new_at(now: i64, expiration: Duration, refresh: Duration) -> Self {
        Self {
            expires_at: now.saturating_add(secs(expiration)),
            refresh_at: now.saturating_add(secs(refresh)),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expires_at > 0 && self.refresh_at > 0
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }

    #[must_use]
    pub fn needs_refresh_at(&self, now: i64) -> bool {
        self.refresh_at < now
    }
}

#[derive(Serialize, Deserialize)]
struct CsrfBody {
    token: String,
    tie: String,
    version: String,
    tied: bool,
}

/// A decoded CSRF token.
///
/// `tied` is derived from `tie` on construction and checked on decode, so a
/// value of this type always satisfies `tied == !tie.is_empty()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteCsrfToken {
    header: CsrfHeader,
    token: String,
    tie: String,
    version: String,
    tied: bool,
}

/// Outcome of checking a CSRF token against the request's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfCheck {
    Valid,
    /// Accepted, but a fresh token should be issued.
    Stale,
    Rejected(&'static str),
}

impl CompleteCsrfToken {
    /// Creates a token with a fresh random value. An empty `tie` makes it anonymous.
    #[must_use]
    pub fn issue(header: CsrfHeader, token_size: usize, tie: &str, version: &str) -> Self {
        Self {
            header,
            token: crypto::generate_id(token_size),
            tie: tie.to_owned(),
            version: version.to_owned(),
            tied: !tie.is_empty(),
        }
    }

    #[must_use]
    pub fn header(&self) -> &CsrfHeader {
        &self.header
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn tie(&self) -> &str {
        &self.tie
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn is_tied(&self) -> bool {
        self.tied
    }

    /// Checks expiry and the session tie.
    ///
    /// An authenticated session only accepts a token tied to its own tie
    /// claim. Without a session, a tied token is still accepted.
    #[must_use]
    pub fn check(&self, claims: Option<&SessionClaims>, now: i64) -> CsrfCheck {
        if !self.header.is_valid() || self.header.is_expired_at(now) {
            return CsrfCheck::Rejected("csrf token expired");
        }

        if let Some(claims) = claims.filter(|c| c.has_session()) {
            if !self.tied {
                return CsrfCheck::Rejected("untied csrf token presented with a session");
            }
            if claims.csrf_tie() != Some(self.tie.as_str()) {
                return CsrfCheck::Rejected("csrf tie does not match session");
            }
        }

        if self.header.needs_refresh_at(now) {
            CsrfCheck::Stale
        } else {
            CsrfCheck::Valid
        }
    }

    /// Seals the token with the store's current key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyStore`] if no current key is available, plus any
    /// encoding or codec error.
    pub fn encode(&self, format: &TokenFormat, keys: &dyn KeyStore) -> Result<String, Error> {
        let key = keys
            .current_key()
            .map_err(|e| Error::KeyStore(e.to_string()))?;
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.header)?);
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&CsrfBody {
            token: self.token.clone(),
            tie: self.tie.clone(),
            version: self.version.clone(),
            tied: self.tied,
        })?);
        token::encode(format, &key, &header, &body)
    }

    /// Opens a sealed CSRF token.
    ///
    /// # Errors
    ///
    /// Returns codec errors, [`Error::Encoding`] for unparseable halves and
    /// [`Error::Malformed`] if the body is inconsistent.
    pub fn decode(format: &TokenFormat, keys: &dyn KeyStore, value: &str) -> Result<Self, Error> {
        let decoded = token::decode(format, keys, value)?;
        let header: CsrfHeader = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&decoded.header)?)?;
        let body: CsrfBody = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&decoded.payload)?)?;

        if body.tied == body.tie.is_empty() {
            return Err(Error::Malformed("csrf tie flag inconsistent"));
        }
        if body.version != format.version {
            return Err(Error::Malformed("csrf body version mismatch"));
        }
        if body.token.is_empty() {
            return Err(Error::Malformed("empty csrf token"));
        }

        Ok(Self {
            header,
            token: body.token,
            tie: body.tie,
            version: body.version,
            tied: body.tied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{SessionKey, StaticKeyStore};
    use crate::session::claim;
    use crate::token::CSRF_VERSION;

    const NOW: i64 = 1_700_000_000;

    fn header() -> CsrfHeader {
        CsrfHeader::new_at(NOW, Duration::from_secs(8 * 3600), Duration::from_secs(1800))
    }

    fn session(tie: &str) -> SessionClaims {
        let mut claims = SessionClaims::new().with(claim::CSRF_TIE, tie);
        claims.mark_authenticated();
        claims
    }

    #[test]
    fn test_tied_flag_follows_tie() {
        assert!(CompleteCsrfToken::issue(header(), 32, "tie", CSRF_VERSION).is_tied());
        assert!(!CompleteCsrfToken::issue(header(), 32, "", CSRF_VERSION).is_tied());
    }

    #[test]
    fn test_round_trip() {
        let keys = StaticKeyStore::generate("k1").unwrap();
        let format = TokenFormat::csrf();
        let token = CompleteCsrfToken::issue(header(), 32, "tie-value", CSRF_VERSION);

        let sealed = token.encode(&format, &keys).unwrap();
        assert!(sealed.starts_with("CG1.k1."));
        let decoded = CompleteCsrfToken::decode(&format, &keys, &sealed).unwrap();
        assert_eq!(decoded, token);
        assert_eq!(decoded.token().len(), 32);
    }

    #[test]
    fn test_session_format_cannot_open_csrf() {
        let keys = StaticKeyStore::generate("k1").unwrap();
        let sealed = CompleteCsrfToken::issue(header(), 32, "", CSRF_VERSION)
            .encode(&TokenFormat::csrf(), &keys)
            .unwrap();
        assert!(CompleteCsrfToken::decode(&TokenFormat::session(), &keys, &sealed).is_err());
    }

    #[test]
    fn test_decode_rejects_inconsistent_tie_flag() {
        let keys = StaticKeyStore::new("k1", vec![5u8; 32]).unwrap();
        let format = TokenFormat::csrf();
        let encoded_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header()).unwrap());
        let body = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&CsrfBody {
                token: "t".repeat(32),
                tie: String::new(),
                version: CSRF_VERSION.into(),
                tied: true,
            })
            .unwrap(),
        );
        let sealed = token::encode(&format, &SessionKey::new("k1", vec![5u8; 32]), &encoded_header, &body).unwrap();

        assert!(matches!(
            CompleteCsrfToken::decode(&format, &keys, &sealed),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_untied_token_rejected_with_session() {
        let token = CompleteCsrfToken::issue(header(), 32, "", CSRF_VERSION);
        assert!(matches!(
            token.check(Some(&session("tie")), NOW),
            CsrfCheck::Rejected(_)
        ));
        assert_eq!(token.check(None, NOW), CsrfCheck::Valid);
    }

    #[test]
    fn test_tie_mismatch_rejected() {
        let token = CompleteCsrfToken::issue(header(), 32, "tie-a", CSRF_VERSION);
        assert!(matches!(
            token.check(Some(&session("tie-b")), NOW),
            CsrfCheck::Rejected(_)
        ));
    }

    #[test]
    fn test_matching_tie_accepted() {
        let token = CompleteCsrfToken::issue(header(), 32, "tie-a", CSRF_VERSION);
        assert_eq!(token.check(Some(&session("tie-a")), NOW), CsrfCheck::Valid);
    }

    #[test]
    fn test_unauthenticated_claims_do_not_require_tie() {
        let token = CompleteCsrfToken::issue(header(), 32, "", CSRF_VERSION);
        let claims = SessionClaims::new().with(claim::CSRF_TIE, "tie");
        assert_eq!(token.check(Some(&claims), NOW), CsrfCheck::Valid);
    }

    #[test]
    fn test_expiry_and_staleness() {
        let token = CompleteCsrfToken::issue(header(), 32, "", CSRF_VERSION);
        assert_eq!(token.check(None, NOW + 1801), CsrfCheck::Stale);
        assert!(matches!(
            token.check(None, NOW + 8 * 3600 + 1),
            CsrfCheck::Rejected(_)
        ));
    }
}
