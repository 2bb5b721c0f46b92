//! Symmetric encryption of stored secrets and one-way hashing of API keys.
//!
//! Key material never leaves this module except through [`CryptoBox::save_keyring`].

pub mod keyring;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::config::SecurityConfig;

pub use keyring::{KeySource, MasterKey, MasterKeySet, load_key_set};

pub const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key version {version} is not available")]
    KeyNotAvailable { version: u32 },

    #[error("Ciphertext failed integrity check")]
    IntegrityFailure,

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Key version {version} is current and cannot be retired")]
    RetireCurrent { version: u32 },

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// What an encrypted value is. Part of the record key and of the AEAD binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    BotEmail,
    BotPassword,
}

impl SecretKind {
    pub const ALL: [Self; 2] = [Self::BotEmail, Self::BotPassword];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BotEmail => "bot_email",
            Self::BotPassword => "bot_password",
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bot_email" => Ok(Self::BotEmail),
            "bot_password" => Ok(Self::BotPassword),
            other => Err(format!("unknown secret kind '{other}'")),
        }
    }
}

/// A secret at rest: ciphertext (with GCM tag), its nonce and the key generation used.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecretRecord {
    pub owner_id: String,
    pub kind: SecretKind,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub key_version: u32,
}

impl std::fmt::Debug for EncryptedSecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSecretRecord")
            .field("owner_id", &self.owner_id)
            .field("kind", &self.kind)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key_version", &self.key_version)
            .finish_non_exhaustive()
    }
}

fn associated_data(owner_id: &str, kind: SecretKind, version: u32) -> String {
    format!("hermes/v{version}/{kind}/{owner_id}")
}

pub struct CryptoBox {
    keys: RwLock<MasterKeySet>,
    argon2_params: Params,
    dummy_hash: String,
}

impl std::fmt::Debug for CryptoBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoBox")
            .field("versions", &self.versions())
            .finish_non_exhaustive()
    }
}

impl CryptoBox {
    pub fn new(keys: MasterKeySet, security: &SecurityConfig) -> Result<Self, CryptoError> {
        let params = Params::new(
            security.argon2_memory_cost_kib,
            security.argon2_time_cost,
            security.argon2_parallelism,
            None,
        )
        .map_err(|e| CryptoError::Hashing(format!("Invalid Argon2 params: {e}")))?;

        Self::with_params(keys, params)
    }

    pub fn with_params(keys: MasterKeySet, argon2_params: Params) -> Result<Self, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::InvalidKeyMaterial(
                "at least one master key generation is required".to_string(),
            ));
        }

        let dummy_hash = hash_with(&argon2_params, b"hermes-timing-equalizer")?;

        Ok(Self {
            keys: RwLock::new(keys),
            argon2_params,
            dummy_hash,
        })
    }

    fn read_keys(&self) -> RwLockReadGuard<'_, MasterKeySet> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_keys(&self) -> RwLockWriteGuard<'_, MasterKeySet> {
        self.keys.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn current_version(&self) -> u32 {
        self.read_keys().current_version().unwrap_or_default()
    }

    #[must_use]
    pub fn versions(&self) -> Vec<u32> {
        self.read_keys().versions()
    }

    #[must_use]
    pub fn has_version(&self, version: u32) -> bool {
        self.read_keys().get(version).is_some()
    }

    /// Makes `key` the current generation. Older generations stay usable for decryption.
    ///
    /// With `persist_to`, the keyring file is rewritten first and nothing changes
    /// in memory if that fails.
    pub fn register(&self, key: MasterKey, persist_to: Option<&Path>) -> Result<u32, CryptoError> {
        let mut keys = self.write_keys();
        let mut next = keys.clone();
        let version = next.register(key);
        if let Some(path) = persist_to {
            next.save_to_file(path)?;
        }
        *keys = next;
        Ok(version)
    }

    /// Drops a non-current generation. Same persistence rule as [`Self::register`].
    pub fn retire(&self, version: u32, persist_to: Option<&Path>) -> Result<(), CryptoError> {
        let mut keys = self.write_keys();
        let mut next = keys.clone();
        next.retire(version)?;
        if let Some(path) = persist_to {
            next.save_to_file(path)?;
        }
        *keys = next;
        Ok(())
    }

    pub fn save_keyring(&self, path: &Path) -> Result<(), CryptoError> {
        self.read_keys().save_to_file(path)
    }

    fn cipher_for(&self, version: u32) -> Result<Aes256Gcm, CryptoError> {
        let keys = self.read_keys();
        let key = keys
            .get(version)
            .ok_or(CryptoError::KeyNotAvailable { version })?;
        Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
    }

    pub fn encrypt(
        &self,
        owner_id: &str,
        kind: SecretKind,
        plaintext: &[u8],
    ) -> Result<EncryptedSecretRecord, CryptoError> {
        let version = self.current_version();
        self.encrypt_with_version(owner_id, kind, plaintext, version)
    }

    pub fn encrypt_with_version(
        &self,
        owner_id: &str,
        kind: SecretKind,
        plaintext: &[u8],
        version: u32,
    ) -> Result<EncryptedSecretRecord, CryptoError> {
        let cipher = self.cipher_for(version)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = associated_data(owner_id, kind, version);

        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::IntegrityFailure)?;

        Ok(EncryptedSecretRecord {
            owner_id: owner_id.to_string(),
            kind,
            ciphertext,
            nonce: nonce.to_vec(),
            key_version: version,
        })
    }

    pub fn decrypt(&self, record: &EncryptedSecretRecord) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let cipher = self.cipher_for(record.key_version)?;
        if record.nonce.len() != NONCE_LEN {
            return Err(CryptoError::IntegrityFailure);
        }

        let aad = associated_data(&record.owner_id, record.kind, record.key_version);
        cipher
            .decrypt(
                Nonce::from_slice(&record.nonce),
                Payload {
                    msg: &record.ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::IntegrityFailure)
    }

    /// Decrypts into a UTF-8 string. Invalid UTF-8 is treated as tampering.
    pub fn decrypt_string(
        &self,
        record: &EncryptedSecretRecord,
    ) -> Result<Zeroizing<String>, CryptoError> {
        let mut bytes = self.decrypt(record)?;
        let text = String::from_utf8(std::mem::take(&mut *bytes)).map_err(|e| {
            e.into_bytes().zeroize();
            CryptoError::IntegrityFailure
        })?;
        Ok(Zeroizing::new(text))
    }

    /// Argon2id PHC string with a fresh random salt. CPU heavy: call from a blocking task.
    pub fn hash_for_verification(&self, plaintext: &str) -> Result<String, CryptoError> {
        hash_with(&self.argon2_params, plaintext.as_bytes())
    }

    /// Constant-time check of `plaintext` against a PHC hash. Malformed hashes never match.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spends the same work as a real verification when there is no candidate hash.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(plaintext, &self.dummy_hash);
    }
}

fn hash_with(params: &Params, plaintext: &[u8]) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut rand_core::OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());

    argon2
        .hash_password(plaintext, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::Hashing(format!("Failed to hash: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 8,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..SecurityConfig::default()
        }
    }

    fn crypto() -> CryptoBox {
        CryptoBox::new(MasterKeySet::generate(), &cheap_security()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let crypto = crypto();
        let record = crypto
            .encrypt("bot-1", SecretKind::BotPassword, b"app-password")
            .unwrap();

        assert_eq!(record.key_version, 1);
        assert_eq!(record.nonce.len(), NONCE_LEN);
        assert_ne!(record.ciphertext.as_slice(), b"app-password");
        assert_eq!(crypto.decrypt(&record).unwrap().as_slice(), b"app-password");
    }

    #[test]
    fn test_nonces_are_unique() {
        let crypto = crypto();
        let a = crypto.encrypt("bot-1", SecretKind::BotEmail, b"x").unwrap();
        let b = crypto.encrypt("bot-1", SecretKind::BotEmail, b"x").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampering_is_detected() {
        let crypto = crypto();
        let record = crypto
            .encrypt("bot-1", SecretKind::BotEmail, b"bot@example.com")
            .unwrap();

        let mut flipped = record.clone();
        flipped.ciphertext[0] ^= 0x01;
        assert!(matches!(
            crypto.decrypt(&flipped),
            Err(CryptoError::IntegrityFailure)
        ));

        let mut truncated = record.clone();
        truncated.ciphertext.truncate(4);
        assert!(matches!(
            crypto.decrypt(&truncated),
            Err(CryptoError::IntegrityFailure)
        ));

        let mut bad_nonce = record.clone();
        bad_nonce.nonce.pop();
        assert!(matches!(
            crypto.decrypt(&bad_nonce),
            Err(CryptoError::IntegrityFailure)
        ));
    }

    #[test]
    fn test_ciphertext_is_bound_to_owner_kind_and_version() {
        let crypto = crypto();
        crypto.register(MasterKey::generate(), None).unwrap();
        let record = crypto
            .encrypt_with_version("bot-1", SecretKind::BotEmail, b"secret", 1)
            .unwrap();

        let mut moved = record.clone();
        moved.owner_id = "bot-2".to_string();
        assert!(matches!(
            crypto.decrypt(&moved),
            Err(CryptoError::IntegrityFailure)
        ));

        let mut swapped = record.clone();
        swapped.kind = SecretKind::BotPassword;
        assert!(matches!(
            crypto.decrypt(&swapped),
            Err(CryptoError::IntegrityFailure)
        ));

        let mut relabelled = record;
        relabelled.key_version = 2;
        assert!(matches!(
            crypto.decrypt(&relabelled),
            Err(CryptoError::IntegrityFailure)
        ));
    }

    #[test]
    fn test_retired_version_is_unavailable() {
        let crypto = crypto();
        let old = crypto.encrypt("bot-1", SecretKind::BotEmail, b"x").unwrap();

        assert_eq!(crypto.register(MasterKey::generate(), None).unwrap(), 2);
        assert_eq!(crypto.current_version(), 2);
        assert_eq!(crypto.decrypt(&old).unwrap().as_slice(), b"x");

        crypto.retire(1, None).unwrap();
        assert!(matches!(
            crypto.decrypt(&old),
            Err(CryptoError::KeyNotAvailable { version: 1 })
        ));
        assert!(matches!(
            crypto.retire(2, None),
            Err(CryptoError::RetireCurrent { version: 2 })
        ));
    }

    #[test]
    fn test_hash_and_verify() {
        let crypto = crypto();
        let hash = crypto.hash_for_verification("hrm_abc_def").unwrap();
        let other = crypto.hash_for_verification("hrm_abc_def").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert_ne!(hash, other, "salts must differ per hash");
        assert!(crypto.verify("hrm_abc_def", &hash));
        assert!(!crypto.verify("hrm_abc_deg", &hash));
        assert!(!crypto.verify("hrm_abc_def", "not-a-phc-string"));
    }

    #[test]
    fn test_empty_key_set_is_rejected() {
        assert!(CryptoBox::new(MasterKeySet::new(), &cheap_security()).is_err());
    }

    #[test]
    fn test_secret_kind_strings() {
        for kind in SecretKind::ALL {
            assert_eq!(kind.as_str().parse::<SecretKind>().unwrap(), kind);
        }
        assert!("api_key".parse::<SecretKind>().is_err());
    }
}
