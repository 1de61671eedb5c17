/// Errors from the token, crypto and key layers.
///
/// Decoding never distinguishes a tampered token from one sealed under a
/// rotated-out key: both surface as [`Error::InvalidToken`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid key size: {0} bytes (expected 16, 24 or 32)")]
    KeySize(usize),

    #[error("secret key cannot be empty")]
    EmptyKey,

    #[error("encryption failed")]
    Encrypt,

    /// Authentication tag mismatch, wrong key, or unknown key id.
    #[error("invalid token")]
    InvalidToken,

    /// Structural bounds violated before any decryption was attempted.
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// Error type returned by consumer-provided collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
