// Credential encryption: ChaCha20-Poly1305 under a single persistent key
//
// The key lives behind the SecureKeyStore collaborator (a hardware keystore
// on a real device) and is cached here wrapped in Zeroizing. Callers only
// ever see ciphertext and IVs; raw key bytes never cross the vault boundary.

use crate::platform::SecureKeyStore;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use parking_lot::Mutex;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Alias the credential key is stored under in the secure key store.
pub const KEY_ALIAS: &str = "badgelink.credential.key";

/// Key length in bytes (256-bit symmetric key)
const KEY_LEN: usize = 32;

/// Nonce length in bytes (96-bit IV, fixed by ChaCha20-Poly1305)
const NONCE_LEN: usize = 12;

/// Errors for vault operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("No credential key available")]
    KeyUnavailable,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Invalid initialization vector")]
    InvalidIv,
    #[error("Invalid key material in store")]
    InvalidKeyMaterial,
    #[error("Key store error: {0}")]
    Store(String),
    #[error("Cipher failure")]
    CipherFailure,
}

/// Output of [`CredentialVault::encrypt`].
///
/// The IV is unique per encryption call and must accompany the ciphertext
/// for decryption; it is never reused across calls with the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

impl EncryptedPayload {
    /// Uppercase hex rendering of the ciphertext for demo output
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.ciphertext)
    }
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EncryptedPayload {{ ciphertext: {} bytes, iv: {} bytes }}",
            self.ciphertext.len(),
            self.iv.len()
        )
    }
}

/// Owns the single process-wide credential key and performs authenticated
/// encryption with it.
///
/// Create-if-absent is serialized internally: concurrent `ensure_key` calls
/// cannot generate two different keys, and a generation race cannot swap
/// the key out from under a concurrent `encrypt` call.
pub struct CredentialVault {
    store: Arc<dyn SecureKeyStore>,
    key: Mutex<Option<Zeroizing<[u8; KEY_LEN]>>>,
}

impl CredentialVault {
    /// Create a vault over the given key store. No key is loaded or
    /// generated until first use.
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self {
            store,
            key: Mutex::new(None),
        }
    }

    /// Create the credential key if and only if none exists.
    ///
    /// Idempotent and safe to call repeatedly. An existing key in the store
    /// is loaded, never overwritten.
    pub fn ensure_key(&self) -> Result<(), CryptoError> {
        let mut key = self.key.lock();
        if key.is_some() {
            return Ok(());
        }

        if let Some(material) = self.store.load_key(KEY_ALIAS) {
            *key = Some(Self::cache_material(material)?);
            return Ok(());
        }

        let mut fresh = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut fresh);
        self.store
            .save_key(KEY_ALIAS, &fresh)
            .map_err(CryptoError::Store)?;

        let cached = Zeroizing::new(fresh);
        fresh.zeroize();
        *key = Some(cached);

        tracing::info!("Credential key generated under alias {}", KEY_ALIAS);
        Ok(())
    }

    /// Drop the cached key. The store copy is untouched; the next call
    /// reloads it.
    pub fn forget_cached_key(&self) {
        *self.key.lock() = None;
    }

    /// Encrypt `plaintext`, generating a fresh random 96-bit IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CryptoError> {
        let mut key = self.key.lock();
        let key = Self::loaded_key(&self.store, &mut key)?;

        let cipher =
            ChaCha20Poly1305::new_from_slice(key.as_ref()).map_err(|_| CryptoError::CipherFailure)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::CipherFailure)?;

        Ok(EncryptedPayload {
            ciphertext,
            iv: nonce_bytes.to_vec(),
        })
    }

    /// Decrypt `ciphertext` with the IV returned by [`Self::encrypt`].
    ///
    /// Fails with `AuthenticationFailed` when the tag does not verify
    /// (corrupted or tampered data).
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != NONCE_LEN {
            return Err(CryptoError::InvalidIv);
        }

        let mut key = self.key.lock();
        let key = Self::loaded_key(&self.store, &mut key)?;

        let cipher =
            ChaCha20Poly1305::new_from_slice(key.as_ref()).map_err(|_| CryptoError::CipherFailure)?;

        cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Whether a key is cached or present in the store
    pub fn has_key(&self) -> bool {
        self.key.lock().is_some() || self.store.load_key(KEY_ALIAS).is_some()
    }

    // Resolve the key under the held lock, lazily loading from the store.
    fn loaded_key<'a>(
        store: &Arc<dyn SecureKeyStore>,
        slot: &'a mut Option<Zeroizing<[u8; KEY_LEN]>>,
    ) -> Result<&'a Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        if slot.is_none() {
            let material = store.load_key(KEY_ALIAS).ok_or(CryptoError::KeyUnavailable)?;
            *slot = Some(Self::cache_material(material)?);
        }
        match slot.as_ref() {
            Some(key) => Ok(key),
            None => Err(CryptoError::KeyUnavailable),
        }
    }

    fn cache_material(mut material: Vec<u8>) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        let result = <[u8; KEY_LEN]>::try_from(material.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::InvalidKeyMaterial);
        material.zeroize();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryKeyStore;
    use proptest::prelude::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(Arc::new(MemoryKeyStore::new()))
    }

    #[test]
    fn test_encrypt_without_key_fails() {
        let vault = vault();
        let result = vault.encrypt(b"credential");
        assert_eq!(result, Err(CryptoError::KeyUnavailable));
    }

    #[test]
    fn test_decrypt_without_key_fails() {
        let vault = vault();
        let result = vault.decrypt(&[0u8; 32], &[0u8; 12]);
        assert_eq!(result, Err(CryptoError::KeyUnavailable));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = vault();
        vault.ensure_key().expect("Key creation");

        let payload = vault.encrypt(b"card-001").expect("Encryption");
        assert_eq!(payload.iv.len(), 12);
        assert_ne!(payload.ciphertext, b"card-001".to_vec());

        let plaintext = vault
            .decrypt(&payload.ciphertext, &payload.iv)
            .expect("Decryption");
        assert_eq!(plaintext, b"card-001".to_vec());
    }

    #[test]
    fn test_ensure_key_is_idempotent() {
        let vault = vault();
        vault.ensure_key().expect("First ensure");

        let payload = vault.encrypt(b"data").expect("Encryption");
        vault.ensure_key().expect("Second ensure");

        // Same key still decrypts: nothing was regenerated
        let plaintext = vault
            .decrypt(&payload.ciphertext, &payload.iv)
            .expect("Decryption after re-ensure");
        assert_eq!(plaintext, b"data".to_vec());
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let vault = vault();
        vault.ensure_key().expect("Key creation");

        let first = vault.encrypt(b"same plaintext").expect("First encryption");
        let second = vault.encrypt(b"same plaintext").expect("Second encryption");

        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let vault = vault();
        vault.ensure_key().expect("Key creation");

        let mut payload = vault.encrypt(b"secret").expect("Encryption");
        payload.ciphertext[0] ^= 0xFF;

        let result = vault.decrypt(&payload.ciphertext, &payload.iv);
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_wrong_iv_fails_authentication() {
        let vault = vault();
        vault.ensure_key().expect("Key creation");

        let payload = vault.encrypt(b"secret").expect("Encryption");
        let result = vault.decrypt(&payload.ciphertext, &[0u8; 12]);
        assert_eq!(result, Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_malformed_iv_length_rejected() {
        let vault = vault();
        vault.ensure_key().expect("Key creation");

        let payload = vault.encrypt(b"secret").expect("Encryption");
        let result = vault.decrypt(&payload.ciphertext, &[0u8; 7]);
        assert_eq!(result, Err(CryptoError::InvalidIv));
    }

    #[test]
    fn test_key_shared_across_vaults_via_store() {
        let store = Arc::new(MemoryKeyStore::new());
        let first = CredentialVault::new(store.clone());
        first.ensure_key().expect("Key creation");
        let payload = first.encrypt(b"cross-vault").expect("Encryption");

        // A second vault over the same store loads, not regenerates
        let second = CredentialVault::new(store);
        second.ensure_key().expect("Key load");
        let plaintext = second
            .decrypt(&payload.ciphertext, &payload.iv)
            .expect("Decryption in second vault");
        assert_eq!(plaintext, b"cross-vault".to_vec());
    }

    #[test]
    fn test_encrypt_loads_existing_store_key_lazily() {
        let store = Arc::new(MemoryKeyStore::new());
        let first = CredentialVault::new(store.clone());
        first.ensure_key().expect("Key creation");

        // Fresh vault, ensure_key never called: the store key is picked up
        let second = CredentialVault::new(store);
        let payload = second.encrypt(b"lazy").expect("Encryption");
        let plaintext = first
            .decrypt(&payload.ciphertext, &payload.iv)
            .expect("Decryption");
        assert_eq!(plaintext, b"lazy".to_vec());
    }

    #[test]
    fn test_forget_cached_key_reloads_from_store() {
        let vault = vault();
        vault.ensure_key().expect("Key creation");
        let payload = vault.encrypt(b"data").expect("Encryption");

        vault.forget_cached_key();
        let plaintext = vault
            .decrypt(&payload.ciphertext, &payload.iv)
            .expect("Decryption after cache drop");
        assert_eq!(plaintext, b"data".to_vec());
    }

    #[test]
    fn test_invalid_key_material_in_store() {
        let store = Arc::new(MemoryKeyStore::new());
        store.save_key(KEY_ALIAS, &[1, 2, 3]).expect("Save");

        let vault = CredentialVault::new(store);
        assert_eq!(vault.ensure_key(), Err(CryptoError::InvalidKeyMaterial));
    }

    #[test]
    fn test_has_key() {
        let vault = vault();
        assert!(!vault.has_key());
        vault.ensure_key().expect("Key creation");
        assert!(vault.has_key());
    }

    #[test]
    fn test_display_hides_contents() {
        let payload = EncryptedPayload {
            ciphertext: vec![0xAA; 16],
            iv: vec![0xBB; 12],
        };
        let shown = payload.to_string();
        assert!(shown.contains("16 bytes"));
        assert!(shown.contains("12 bytes"));
        assert!(!shown.contains("AA"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_all_payloads(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let vault = vault();
            vault.ensure_key().expect("Key creation");
            let payload = vault.encrypt(&plaintext).expect("Encryption");
            let decrypted = vault.decrypt(&payload.ciphertext, &payload.iv).expect("Decryption");
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
