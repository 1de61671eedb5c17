use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::crypto;
use crate::error::Error;
use crate::keys::{KeyStore, SessionKey};

/// Default delimiter between wire-format parts.
pub const DEFAULT_DELIMITER: &str = ".";

/// Session token format version.
pub const SESSION_VERSION: &str = "SG1";
/// CSRF token format version.
pub const CSRF_VERSION: &str = "CG1";

/// Structural bounds checked before any decryption is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    pub min_size: usize,
    pub max_size: usize,
    pub min_key_id: usize,
    pub max_key_id: usize,
    pub min_version: usize,
    pub max_version: usize,
}

impl TokenLimits {
    pub const SESSION: Self = Self {
        min_size: 128,
        max_size: 4 * 1024 - 1,
        min_key_id: 1,
        max_key_id: 32,
        min_version: 1,
        max_version: 32,
    };

    pub const CSRF: Self = Self {
        min_size: 128,
        max_size: 1024,
        min_key_id: 1,
        max_key_id: 32,
        min_version: 1,
        max_version: 32,
    };
}

/// Everything needed to seal or open one kind of token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFormat {
    pub version: String,
    pub delimiter: String,
    pub limits: TokenLimits,
}

impl TokenFormat {
    #[must_use]
    pub fn new(version: impl Into<String>, limits: TokenLimits) -> Self {
        Self {
            version: version.into(),
            delimiter: DEFAULT_DELIMITER.into(),
            limits,
        }
    }

    #[must_use]
    pub fn session() -> Self {
        Self::new(SESSION_VERSION, TokenLimits::SESSION)
    }

    #[must_use]
    pub fn csrf() -> Self {
        Self::new(CSRF_VERSION, TokenLimits::CSRF)
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }
}

/// The two opaque halves recovered from a token, plus the key id that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub key_id: String,
    pub header: String,
    pub payload: String,
}

/// Seals `header` and `payload` into `VERSION.KEYID.BASE64URL(nonce|ciphertext|tag)`.
///
/// The key id and version are bound into the ciphertext as associated data.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the key id or version violate the format
/// bounds or contain the delimiter, and crypto errors from sealing.
pub fn encode(
    format: &TokenFormat,
    key: &SessionKey,
    header: &str,
    payload: &str,
) -> Result<String, Error> {
    let limits = &format.limits;
    let delim = format.delimiter.as_str();
    if delim.is_empty() {
        return Err(Error::Malformed("empty delimiter"));
    }
    if !(limits.min_key_id..=limits.max_key_id).contains(&key.id.len()) {
        return Err(Error::Malformed("key id length out of bounds"));
    }
    if !(limits.min_version..=limits.max_version).contains(&format.version.len()) {
        return Err(Error::Malformed("version length out of bounds"));
    }
    if key.id.contains(delim) || format.version.contains(delim) {
        return Err(Error::Malformed("key id or version contains delimiter"));
    }

    let plaintext = format!("{header}{delim}{payload}");
    let aad = associated_data(&key.id, &format.version);
    let sealed = crypto::encrypt(&key.bytes, plaintext.as_bytes(), &aad)?;

    Ok(format!(
        "{}{delim}{}{delim}{}",
        format.version,
        key.id,
        URL_SAFE_NO_PAD.encode(sealed)
    ))
}

/// Opens a token produced by [`encode`], resolving its key through `keys`.
///
/// # Errors
///
/// - [`Error::Malformed`] for size, part-count, length or version violations
/// - [`Error::InvalidToken`] for an unknown key id or a failed authentication tag
/// - [`Error::KeyStore`] if the key store itself fails
pub fn decode(format: &TokenFormat, keys: &dyn KeyStore, token: &str) -> Result<DecodedToken, Error> {
    let limits = &format.limits;
    let delim = format.delimiter.as_str();
    if delim.is_empty() {
        return Err(Error::Malformed("empty delimiter"));
    }
    if !(limits.min_size..=limits.max_size).contains(&token.len()) {
        return Err(Error::Malformed("token size out of bounds"));
    }

    let mut parts = token.splitn(3, delim);
    let (Some(version), Some(key_id), Some(body)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Malformed("expected three parts"));
    };

    if !(limits.min_key_id..=limits.max_key_id).contains(&key_id.len()) {
        return Err(Error::Malformed("key id length out of bounds"));
    }
    if !(limits.min_version..=limits.max_version).contains(&version.len()) {
        return Err(Error::Malformed("version length out of bounds"));
    }
    if version != format.version {
        return Err(Error::Malformed("unexpected version"));
    }

    let key = keys
        .key_by_id(key_id)
        .map_err(|e| Error::KeyStore(e.to_string()))?
        .ok_or(Error::InvalidToken)?;

    let sealed = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| Error::Malformed("body is not base64url"))?;
    let plaintext = crypto::decrypt(&key, &sealed, &associated_data(key_id, version))?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| Error::Malformed("body is not utf-8"))?;

    let (header, payload) = plaintext
        .split_once(delim)
        .ok_or(Error::Malformed("missing header delimiter"))?;

    Ok(DecodedToken {
        key_id: key_id.to_owned(),
        header: header.to_owned(),
        payload: payload.to_owned(),
    })
}

fn associated_data(key_id: &str, version: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(key_id.len() + version.len());
    aad.extend_from_slice(key_id.as_bytes());
    aad.extend_from_slice(version.as_bytes());
    aad
}
