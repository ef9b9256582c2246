//! AES-256-GCM encryption plus the prefix-aware filter wrappers
//!
//! `encrypt`/`decrypt` are the bare cipher and know nothing about the magic
//! prefix. `seal`/`open` are what the clean and smudge filters call.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use chartcrypt_core::{CryptError, CryptResult};
use rand::RngCore;

use crate::key::SymmetricKey;
use crate::{MAGIC_PREFIX, NONCE_SIZE, TAG_SIZE};

/// Encrypt with a fresh random nonce.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("AES-256-GCM encryption failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt the output of [`encrypt`].
pub fn decrypt(key: &SymmetricKey, encrypted: &[u8]) -> CryptResult<Vec<u8>> {
    if encrypted.len() < NONCE_SIZE + TAG_SIZE {
        tracing::debug!(
            len = encrypted.len(),
            "ciphertext shorter than nonce + tag"
        );
        return Err(CryptError::CipherIntegrity);
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptError::CipherIntegrity)
}

pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(MAGIC_PREFIX)
}

/// Clean-filter entry point.
///
/// Already-prefixed input is returned untouched and `key` is never called,
/// so re-running the filter over committed content cannot double-wrap it.
pub fn seal<F>(input: Vec<u8>, key: F) -> CryptResult<Vec<u8>>
where
    F: FnOnce() -> CryptResult<SymmetricKey>,
{
    if is_encrypted(&input) {
        tracing::debug!("input already encrypted, passing through");
        return Ok(input);
    }

    let key = key()?;
    let ciphertext = encrypt(&key, &input)?;

    let mut out = Vec::with_capacity(MAGIC_PREFIX.len() + ciphertext.len());
    out.extend_from_slice(MAGIC_PREFIX);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Smudge/textconv entry point.
///
/// Input without the prefix (never encrypted, or outside the filter globs)
/// is returned untouched and `key` is never called.
pub fn open<F>(input: Vec<u8>, key: F) -> CryptResult<Vec<u8>>
where
    F: FnOnce() -> CryptResult<SymmetricKey>,
{
    if !is_encrypted(&input) {
        tracing::debug!("input not encrypted, passing through");
        return Ok(input);
    }

    let key = key()?;
    decrypt(&key, &input[MAGIC_PREFIX.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_key() -> SymmetricKey {
        SymmetricKey::from_bytes([42u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate();
        let plaintext = b"replicaCount: 3\npassword: hunter2\n";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = SymmetricKey::generate();

        let encrypted = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, b"");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = fixed_key();
        let a = encrypt(&key, b"same input").unwrap();
        let b = encrypt(&key, b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let k1 = SymmetricKey::from_bytes([1u8; 32]);
        let k2 = SymmetricKey::from_bytes([2u8; 32]);

        let encrypted = encrypt(&k1, b"secret data").unwrap();
        let result = decrypt(&k2, &encrypted);

        assert!(matches!(result, Err(CryptError::CipherIntegrity)));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = fixed_key();

        let mut encrypted = encrypt(&key, b"secret data").unwrap();
        encrypted[NONCE_SIZE + 1] ^= 0xFF;

        let result = decrypt(&key, &encrypted);
        assert!(matches!(result, Err(CryptError::CipherIntegrity)));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let key = fixed_key();
        let result = decrypt(&key, &[0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(result, Err(CryptError::CipherIntegrity)));
    }

    #[test]
    fn test_encrypted_size() {
        let key = fixed_key();
        let encrypted = encrypt(&key, &[0u8; 1000]).unwrap();

        // nonce (12) + plaintext (1000) + tag (16)
        assert_eq!(encrypted.len(), NONCE_SIZE + 1000 + TAG_SIZE);
    }

    #[test]
    fn test_seal_adds_prefix() {
        let sealed = seal(b"hello".to_vec(), || Ok(fixed_key())).unwrap();
        assert!(sealed.starts_with(MAGIC_PREFIX));
        assert!(is_encrypted(&sealed));
    }

    #[test]
    fn test_seal_is_idempotent() {
        let once = seal(b"hello".to_vec(), || Ok(fixed_key())).unwrap();
        let twice = seal(once.clone(), || Ok(fixed_key())).unwrap();
        assert_eq!(once, twice, "sealing sealed data must not double wrap");
    }

    #[test]
    fn test_seal_passthrough_skips_key_lookup() {
        let mut input = MAGIC_PREFIX.to_vec();
        input.extend_from_slice(b"opaque");
        let out = seal(input.clone(), || {
            Err(CryptError::KeyUnreadable("must not be called".into()))
        })
        .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_open_passthrough_for_plaintext() {
        let input = b"not encrypted at all".to_vec();
        let out = open(input.clone(), || {
            Err(CryptError::KeyUnreadable("must not be called".into()))
        })
        .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_open_reverses_seal() {
        let sealed = seal(b"db_password: s3cret".to_vec(), || Ok(fixed_key())).unwrap();
        let opened = open(sealed, || Ok(fixed_key())).unwrap();
        assert_eq!(opened, b"db_password: s3cret");
    }

    #[test]
    fn test_open_with_foreign_key_fails() {
        let sealed = seal(b"data".to_vec(), || Ok(SymmetricKey::generate())).unwrap();
        let result = open(sealed, || Ok(SymmetricKey::generate()));
        assert!(matches!(result, Err(CryptError::CipherIntegrity)));
    }

    #[test]
    fn test_open_propagates_key_errors() {
        let sealed = seal(b"data".to_vec(), || Ok(fixed_key())).unwrap();
        let result = open(sealed, || Err(CryptError::KeyUnreadable("gone".into())));
        assert!(matches!(result, Err(CryptError::KeyUnreadable(_))));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let key = fixed_key();
            let encrypted = encrypt(&key, &data).unwrap();
            prop_assert_eq!(decrypt(&key, &encrypted).unwrap(), data);
        }

        #[test]
        fn prop_seal_open_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            prop_assume!(!data.starts_with(MAGIC_PREFIX));
            let sealed = seal(data.clone(), || Ok(fixed_key())).unwrap();
            let resealed = seal(sealed.clone(), || Ok(fixed_key())).unwrap();
            prop_assert_eq!(&resealed, &sealed);
            prop_assert_eq!(open(sealed, || Ok(fixed_key())).unwrap(), data);
        }

        #[test]
        fn prop_open_passes_unprefixed_input(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assume!(!data.starts_with(MAGIC_PREFIX));
            let out = open(data.clone(), || Ok(fixed_key())).unwrap();
            prop_assert_eq!(out, data);
        }
    }
}
