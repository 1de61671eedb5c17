#![doc = include_str!("../README.md")]

pub mod cache;
pub mod crypto;
pub mod csrf;
pub mod error;
pub mod keys;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod rbac;
pub mod session;
pub mod token;

// Re-exports for convenient access
pub use cache::{Cache, MemoryCache};
pub use csrf::{CompleteCsrfToken, CsrfCheck, CsrfHeader};
pub use error::{BoxError, Error};
pub use keys::{KeyStore, SessionKey, StaticKeyStore};
pub use session::{SessionClaims, SessionHeader};
pub use token::{TokenFormat, TokenLimits};
