//! Stateless crypto primitives shared by session and CSRF tokens.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce, OsRng, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::Sha256;

use crate::error::Error;

/// AES-128 key size in bytes.
pub const AES_KEY_SIZE_16: usize = 16;
/// AES-192 key size in bytes.
pub const AES_KEY_SIZE_24: usize = 24;
/// AES-256 key size in bytes.
pub const AES_KEY_SIZE_32: usize = 32;

type Aes192Gcm = AesGcm<Aes192, U12>;
type HmacSha256 = Hmac<Sha256>;

/// Generates a random symmetric key of 16, 24 or 32 bytes.
///
/// # Errors
///
/// Returns [`Error::KeySize`] for any other size.
pub fn generate_symmetric_key(size: usize) -> Result<Vec<u8>, Error> {
    if !matches!(size, AES_KEY_SIZE_16 | AES_KEY_SIZE_24 | AES_KEY_SIZE_32) {
        return Err(Error::KeySize(size));
    }
    let mut key = vec![0u8; size];
    rand::rng().fill(key.as_mut_slice());
    Ok(key)
}

/// Encrypts `plaintext` with AES-GCM, binding `associated_data`.
///
/// The cipher width follows the key length. A fresh nonce is generated per
/// call and prepended to the returned ciphertext.
///
/// # Errors
///
/// Returns [`Error::KeySize`] for unsupported key lengths and
/// [`Error::Encrypt`] if sealing fails.
pub fn encrypt(key: &[u8], plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, Error> {
    match key.len() {
        AES_KEY_SIZE_16 => seal::<Aes128Gcm>(key, plaintext, associated_data),
        AES_KEY_SIZE_24 => seal::<Aes192Gcm>(key, plaintext, associated_data),
        AES_KEY_SIZE_32 => seal::<Aes256Gcm>(key, plaintext, associated_data),
        other => Err(Error::KeySize(other)),
    }
}

/// Decrypts a nonce-prefixed AES-GCM ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`Error::InvalidToken`] when the input is too short, the tag does
/// not verify, or the associated data differs from the one used to seal.
pub fn decrypt(key: &[u8], sealed: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, Error> {
    match key.len() {
        AES_KEY_SIZE_16 => open::<Aes128Gcm>(key, sealed, associated_data),
        AES_KEY_SIZE_24 => open::<Aes192Gcm>(key, sealed, associated_data),
        AES_KEY_SIZE_32 => open::<Aes256Gcm>(key, sealed, associated_data),
        other => Err(Error::KeySize(other)),
    }
}

fn seal<C>(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| Error::KeySize(key.len()))?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| Error::Encrypt)?;

    let mut sealed = Vec::with_capacity(nonce.len() + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open<C>(key: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error>
where
    C: Aead + AeadCore + KeyInit,
{
    let nonce_len = <C as AeadCore>::NonceSize::USIZE;
    if sealed.len() < nonce_len {
        return Err(Error::InvalidToken);
    }
    let cipher = C::new_from_slice(key).map_err(|_| Error::InvalidToken)?;
    let (nonce, ciphertext) = sealed.split_at(nonce_len);
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::InvalidToken)
}

/// Computes an HMAC-SHA256 signature over `data`.
///
/// # Errors
///
/// Returns [`Error::EmptyKey`] if `secret` is empty.
pub fn hmac_sign(data: &[u8], secret: &[u8]) -> Result<Vec<u8>, Error> {
    if secret.is_empty() {
        return Err(Error::EmptyKey);
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| Error::EmptyKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verifies an HMAC-SHA256 signature in constant time.
///
/// # Errors
///
/// Returns [`Error::EmptyKey`] if `secret` is empty.
pub fn hmac_verify(data: &[u8], signature: &[u8], secret: &[u8]) -> Result<bool, Error> {
    if secret.is_empty() {
        return Err(Error::EmptyKey);
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| Error::EmptyKey)?;
    mac.update(data);
    Ok(mac.verify_slice(signature).is_ok())
}

/// Generates a random alphanumeric identifier of `length` characters.
#[must_use]
pub fn generate_id(length: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_sizes() {
        for size in [16, 24, 32] {
            assert_eq!(generate_symmetric_key(size).unwrap().len(), size);
        }
        assert!(matches!(generate_symmetric_key(20), Err(Error::KeySize(20))));
        assert!(generate_symmetric_key(0).is_err());
    }

    #[test]
    fn test_encrypt_decrypt_all_widths() {
        for size in [16, 24, 32] {
            let key = generate_symmetric_key(size).unwrap();
            let sealed = encrypt(&key, b"hello", b"ad").unwrap();
            assert_eq!(decrypt(&key, &sealed, b"ad").unwrap(), b"hello");
        }
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = generate_symmetric_key(32).unwrap();
        let a = encrypt(&key, b"same", b"").unwrap();
        let b = encrypt(&key, b"same", b"").unwrap();
        assert_ne!(a, b, "nonce must differ between encryptions");
    }

    #[test]
    fn test_decrypt_rejects_wrong_associated_data() {
        let key = generate_symmetric_key(32).unwrap();
        let sealed = encrypt(&key, b"payload", b"k1SG1").unwrap();
        assert!(matches!(
            decrypt(&key, &sealed, b"k2SG1"),
            Err(Error::InvalidToken)
        ));
    }

    #[test]
    fn test_decrypt_rejects_wrong_key() {
        let key = generate_symmetric_key(32).unwrap();
        let other = generate_symmetric_key(32).unwrap();
        let sealed = encrypt(&key, b"payload", b"").unwrap();
        assert!(decrypt(&other, &sealed, b"").is_err());
    }

    #[test]
    fn test_decrypt_rejects_short_input() {
        let key = generate_symmetric_key(16).unwrap();
        assert!(matches!(decrypt(&key, &[0u8; 5], b""), Err(Error::InvalidToken)));
    }

    #[test]
    fn test_encrypt_rejects_bad_key() {
        assert!(matches!(encrypt(&[1u8; 7], b"x", b""), Err(Error::KeySize(7))));
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let sig = hmac_sign(b"data", b"secret").unwrap();
        assert_eq!(sig.len(), 32);
        assert!(hmac_verify(b"data", &sig, b"secret").unwrap());
        assert!(!hmac_verify(b"other", &sig, b"secret").unwrap());
        assert!(!hmac_verify(b"data", &sig, b"wrong").unwrap());
    }

    #[test]
    fn test_hmac_empty_key() {
        assert!(matches!(hmac_sign(b"data", b""), Err(Error::EmptyKey)));
        assert!(matches!(hmac_verify(b"data", b"", b""), Err(Error::EmptyKey)));
    }

    #[test]
    fn test_generate_id() {
        let id = generate_id(32);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(32), generate_id(32));
        assert!(generate_id(0).is_empty());
    }
}
