//! Session token model: lifetime header plus string claims.

mod claims;
mod header;

pub use claims::{SessionClaims, claim};
pub use header::SessionHeader;
pub(crate) use header::{now_unix, secs};

use crate::crypto;
use crate::error::Error;
use crate::keys::KeyStore;
use crate::token::{self, TokenFormat};

/// Length of generated session ids, CSRF ties and RBAC cache ids.
pub const ID_LENGTH: usize = 32;

/// Fills in the reserved claims every issued session carries.
///
/// Mode, tie, session id and RBAC cache id are only set when absent. The
/// version claim is always overwritten with `version`.
pub fn ensure_basic_claims(claims: &mut SessionClaims, mode: &str, version: &str, with_rbac: bool) {
    claims.set_if_not_set(claim::SESSION_MODE, mode);
    if claims.csrf_tie().is_none() {
        claims.set(claim::CSRF_TIE, crypto::generate_id(ID_LENGTH));
    }
    if claims.session_id().is_none() {
        claims.set(claim::SESSION_ID, crypto::generate_id(ID_LENGTH));
    }
    if with_rbac && claims.rbac_cache_id().is_none() {
        claims.set(claim::RBAC_CACHE_ID, crypto::generate_id(ID_LENGTH));
    }
    claims.set(claim::VERSION, version);
}

/// Seals a header and claims with the store's current key.
///
/// # Errors
///
/// Returns [`Error::KeyStore`] if no current key is available, plus any
/// encoding or codec error.
pub fn encode_session(
    format: &TokenFormat,
    keys: &dyn KeyStore,
    header: &SessionHeader,
    claims: &SessionClaims,
) -> Result<String, Error> {
    let key = keys
        .current_key()
        .map_err(|e| Error::KeyStore(e.to_string()))?;
    token::encode(format, &key, &header.encode()?, &claims.encode_payload()?)
}

/// Opens a session token. Returned claims are not yet authenticated.
///
/// # Errors
///
/// Returns codec errors for malformed or tampered tokens and
/// [`Error::Encoding`] if the decrypted halves do not parse.
pub fn decode_session(
    format: &TokenFormat,
    keys: &dyn KeyStore,
    token: &str,
) -> Result<(SessionHeader, SessionClaims), Error> {
    let decoded = token::decode(format, keys, token)?;
    let header = SessionHeader::decode(&decoded.header)?;
    let claims = SessionClaims::decode_payload(&decoded.payload)?;
    Ok((header, claims))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::keys::StaticKeyStore;
    use crate::token::SESSION_VERSION;

    #[test]
    fn test_ensure_basic_claims_fills_missing() {
        let mut claims = SessionClaims::new();
        ensure_basic_claims(&mut claims, "user", SESSION_VERSION, true);

        assert_eq!(claims.session_mode(), Some("user"));
        assert_eq!(claims.csrf_tie().map(str::len), Some(ID_LENGTH));
        assert_eq!(claims.session_id().map(str::len), Some(ID_LENGTH));
        assert_eq!(claims.rbac_cache_id().map(str::len), Some(ID_LENGTH));
        assert_eq!(claims.version(), Some("SG1"));
    }

    #[test]
    fn test_ensure_basic_claims_keeps_existing() {
        let mut claims = SessionClaims::new()
            .with(claim::SESSION_MODE, "admin")
            .with(claim::SESSION_ID, "sid")
            .with(claim::VERSION, "old");
        ensure_basic_claims(&mut claims, "user", SESSION_VERSION, false);

        assert_eq!(claims.session_mode(), Some("admin"));
        assert_eq!(claims.session_id(), Some("sid"));
        assert_eq!(claims.version(), Some("SG1"));
        assert!(!claims.has_claim(claim::RBAC_CACHE_ID));
    }

    #[test]
    fn test_session_round_trip() {
        let keys = StaticKeyStore::generate("k1").unwrap();
        let format = TokenFormat::session();
        let header = SessionHeader::new(false, Duration::from_secs(600), Duration::from_secs(60));
        let mut claims = SessionClaims::new().with("user", "42");
        ensure_basic_claims(&mut claims, "user", SESSION_VERSION, false);

        let token = encode_session(&format, &keys, &header, &claims).unwrap();
        let (decoded_header, decoded_claims) = decode_session(&format, &keys, &token).unwrap();

        assert_eq!(decoded_header, header);
        assert_eq!(decoded_claims.get("user"), Some("42"));
        assert_eq!(decoded_claims.session_id(), claims.session_id());
        assert!(!decoded_claims.has_session());
    }

    #[test]
    fn test_rotated_key_still_decodes() {
        let keys = StaticKeyStore::generate("k1").unwrap();
        let format = TokenFormat::session();
        let header = SessionHeader::new(false, Duration::from_secs(600), Duration::from_secs(60));
        let mut claims = SessionClaims::new();
        ensure_basic_claims(&mut claims, "user", SESSION_VERSION, false);
        let token = encode_session(&format, &keys, &header, &claims).unwrap();

        keys.rotate("k2", crypto::generate_symmetric_key(32).unwrap()).unwrap();
        assert!(decode_session(&format, &keys, &token).is_ok());

        keys.retire("k1");
        assert!(matches!(
            decode_session(&format, &keys, &token),
            Err(Error::InvalidToken)
        ));
    }
}
