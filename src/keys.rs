use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::crypto;
use crate::error::{BoxError, Error};

/// A symmetric key together with the identifier embedded in every token it seals.
#[derive(Clone)]
pub struct SessionKey {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl SessionKey {
    #[must_use]
    pub fn new(id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("id", &self.id)
            .field("bytes", &"[redacted]")
            .finish()
    }
}

/// Consumer-provided key storage.
///
/// `current_key` is used for every new token. `key_by_id` resolves the key
/// named inside an incoming token and must keep answering for rotated-out
/// keys for as long as their tokens should stay readable.
///
/// `Ok(None)` from `key_by_id` means the id is unknown. The token is then
/// rejected exactly like a tampered one.
pub trait KeyStore: Send + Sync + 'static {
    fn current_key(&self) -> Result<SessionKey, BoxError>;

    fn key_by_id(&self, key_id: &str) -> Result<Option<Vec<u8>>, BoxError>;
}

impl<K: KeyStore> KeyStore for Arc<K> {
    fn current_key(&self) -> Result<SessionKey, BoxError> {
        (**self).current_key()
    }

    fn key_by_id(&self, key_id: &str) -> Result<Option<Vec<u8>>, BoxError> {
        (**self).key_by_id(key_id)
    }
}

/// In-process key store with rotation support.
pub struct StaticKeyStore {
    inner: RwLock<KeyRing>,
}

struct KeyRing {
    current: String,
    keys: HashMap<String, Vec<u8>>,
}

impl StaticKeyStore {
    /// Creates a store whose current key is `bytes` under `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySize`] if `bytes` is not 16, 24 or 32 bytes long.
    pub fn new(key_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let key_id = key_id.into();
        let bytes = bytes.into();
        check_key(&key_id, &bytes)?;

        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), bytes);
        Ok(Self {
            inner: RwLock::new(KeyRing {
                current: key_id,
                keys,
            }),
        })
    }

    /// Creates a store with a freshly generated AES-256 key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyStore`] if `key_id` is empty.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, Error> {
        Self::new(key_id, crypto::generate_symmetric_key(crypto::AES_KEY_SIZE_32)?)
    }

    /// Makes `bytes` the current key. Previous keys stay available for decoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySize`] for an unsupported key length.
    pub fn rotate(&self, key_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<(), Error> {
        let key_id = key_id.into();
        let bytes = bytes.into();
        check_key(&key_id, &bytes)?;

        let mut ring = self.inner.write();
        ring.keys.insert(key_id.clone(), bytes);
        ring.current = key_id;
        Ok(())
    }

    /// Drops a rotated-out key. Tokens sealed under it stop decoding.
    ///
    /// Returns `false` if `key_id` is the current key or unknown.
    pub fn retire(&self, key_id: &str) -> bool {
        let mut ring = self.inner.write();
        if ring.current == key_id {
            return false;
        }
        ring.keys.remove(key_id).is_some()
    }
}

fn check_key(key_id: &str, bytes: &[u8]) -> Result<(), Error> {
    if key_id.is_empty() {
        return Err(Error::KeyStore("key id cannot be empty".into()));
    }
    if !matches!(
        bytes.len(),
        crypto::AES_KEY_SIZE_16 | crypto::AES_KEY_SIZE_24 | crypto::AES_KEY_SIZE_32
    ) {
        return Err(Error::KeySize(bytes.len()));
    }
    Ok(())
}

impl KeyStore for StaticKeyStore {
    fn current_key(&self) -> Result<SessionKey, BoxError> {
        let ring = self.inner.read();
        let bytes = ring
            .keys
            .get(&ring.current)
            .ok_or_else(|| Error::KeyStore(format!("current key {} missing", ring.current)))?;
        Ok(SessionKey::new(ring.current.clone(), bytes.clone()))
    }

    fn key_by_id(&self, key_id: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.inner.read().keys.get(key_id).cloned())
    }
}

impl fmt::Debug for StaticKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.inner.read();
        f.debug_struct("StaticKeyStore")
            .field("current", &ring.current)
            .field("keys", &ring.keys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_key() {
        let store = StaticKeyStore::new("k1", vec![7u8; 32]).unwrap();
        let key = store.current_key().unwrap();
        assert_eq!(key.id, "k1");
        assert_eq!(key.bytes, vec![7u8; 32]);
    }

    #[test]
    fn test_rejects_bad_key() {
        assert!(matches!(
            StaticKeyStore::new("k1", vec![0u8; 10]),
            Err(Error::KeySize(10))
        ));
        assert!(matches!(
            StaticKeyStore::new("", vec![0u8; 16]),
            Err(Error::KeyStore(_))
        ));
    }

    #[test]
    fn test_rotation_keeps_old_keys() {
        let store = StaticKeyStore::generate("k1").unwrap();
        let old = store.current_key().unwrap();
        store.rotate("k2", vec![1u8; 16]).unwrap();

        assert_eq!(store.current_key().unwrap().id, "k2");
        assert_eq!(store.key_by_id("k1").unwrap(), Some(old.bytes));
        assert!(store.key_by_id("k3").unwrap().is_none());
    }

    #[test]
    fn test_retire() {
        let store = StaticKeyStore::generate("k1").unwrap();
        store.rotate("k2", vec![1u8; 24]).unwrap();

        assert!(!store.retire("k2"), "current key cannot be retired");
        assert!(store.retire("k1"));
        assert!(!store.retire("k1"));
        assert!(store.key_by_id("k1").unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_bytes() {
        let key = SessionKey::new("k1", vec![9u8; 16]);
        let debug = format!("{key:?}");
        assert!(debug.contains("redacted"));
        assert!(!debug.contains('9'));
    }
}
