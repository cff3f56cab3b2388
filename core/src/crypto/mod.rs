//! Credential encryption layer.

pub mod vault;

pub use vault::{CredentialVault, CryptoError, EncryptedPayload, KEY_ALIAS};
