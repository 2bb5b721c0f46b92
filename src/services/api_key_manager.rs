//! Domain service for API key issuance, approval and verification.
//!
//! Keys look like `hrm_1a2b3c4d_<64 hex chars>`. The middle segment is a
//! non-secret lookup prefix that narrows verification to a handful of rows;
//! only an Argon2id hash of the whole key is stored.

use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::CryptoError;
use crate::models::{ApiKey, ApiKeyState};

pub const LOOKUP_LEN: usize = 8;
pub const SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ApiKeyError {
    /// Deliberately vague: malformed, unknown, pending and revoked keys all look the same.
    #[error("invalid or revoked key")]
    InvalidKey,

    #[error("API key not found")]
    NotFound,

    #[error("User already has a pending or active API key")]
    AlreadyPending,

    #[error("Cannot move API key from {from} to {to}")]
    InvalidStateTransition { from: ApiKeyState, to: ApiKeyState },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for ApiKeyError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ApiKeyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// A freshly issued key. `plaintext` exists only in this value and is never stored.
pub struct IssuedApiKey {
    pub key: ApiKey,
    pub plaintext: Zeroizing<String>,
}

impl fmt::Debug for IssuedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedApiKey")
            .field("key", &self.key)
            .field("plaintext", &"<redacted>")
            .finish()
    }
}

/// Identity resolved from a presented key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedApiKey {
    pub key_id: String,
    pub user_id: String,
}

/// The segments of a presented key.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedApiKey<'a> {
    pub tag: &'a str,
    pub lookup: &'a str,
    pub secret: &'a str,
}

impl<'a> ParsedApiKey<'a> {
    /// Splits `presented` into its segments, checking shape only.
    #[must_use]
    pub fn parse(presented: &'a str, expected_tag: &str) -> Option<Self> {
        let mut parts = presented.splitn(3, '_');
        let tag = parts.next()?;
        let lookup = parts.next()?;
        let secret = parts.next()?;

        let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
        if tag != expected_tag
            || lookup.len() != LOOKUP_LEN
            || secret.len() != SECRET_BYTES * 2
            || !is_hex(lookup)
            || !is_hex(secret)
        {
            return None;
        }

        Some(Self {
            tag,
            lookup,
            secret,
        })
    }
}

/// Generates `(lookup_prefix, full_key)`.
#[must_use]
pub fn generate_api_key(tag: &str) -> (String, Zeroizing<String>) {
    use rand::Rng;

    let mut rng = rand::rng();
    let lookup: [u8; LOOKUP_LEN / 2] = rng.random();
    let secret = Zeroizing::new(rng.random::<[u8; SECRET_BYTES]>());

    let lookup = hex::encode(lookup);
    let full = Zeroizing::new(format!("{tag}_{lookup}_{}", hex::encode(&*secret)));
    (lookup, full)
}

#[async_trait::async_trait]
pub trait ApiKeyManager: Send + Sync {
    /// Issues a new key in `pending` state and returns its plaintext once.
    ///
    /// # Errors
    ///
    /// Returns [`ApiKeyError::AlreadyPending`] if the user already holds a pending or active key.
    async fn issue_pending(&self, user_id: &str) -> Result<IssuedApiKey, ApiKeyError>;

    /// `pending -> active`.
    async fn approve(&self, key_id: &str) -> Result<ApiKey, ApiKeyError>;

    /// `pending -> rejected`.
    async fn reject(&self, key_id: &str) -> Result<ApiKey, ApiKeyError>;

    /// `pending | active -> revoked`.
    async fn revoke(&self, key_id: &str) -> Result<ApiKey, ApiKeyError>;

    /// Resolves an active key to its owner.
    ///
    /// # Errors
    ///
    /// Every kind of failure is reported as [`ApiKeyError::InvalidKey`].
    async fn verify(&self, presented: &str) -> Result<VerifiedApiKey, ApiKeyError>;

    async fn get(&self, key_id: &str) -> Result<ApiKey, ApiKeyError>;

    async fn live_key_for_user(&self, user_id: &str) -> Result<Option<ApiKey>, ApiKeyError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>, ApiKeyError>;

    /// Revokes every pending or active key of the user.
    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, ApiKeyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_parses() {
        let (lookup, key) = generate_api_key("hrm");
        let parsed = ParsedApiKey::parse(&key, "hrm").unwrap();

        assert_eq!(parsed.tag, "hrm");
        assert_eq!(parsed.lookup, lookup);
        assert_eq!(parsed.secret.len(), 64);
    }

    #[test]
    fn test_generated_keys_differ() {
        let (_, a) = generate_api_key("hrm");
        let (_, b) = generate_api_key("hrm");
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        let (_, key) = generate_api_key("hrm");

        assert!(ParsedApiKey::parse(&key, "other").is_none());
        assert!(ParsedApiKey::parse("", "hrm").is_none());
        assert!(ParsedApiKey::parse("hrm_abcd", "hrm").is_none());
        assert!(ParsedApiKey::parse(&key[..key.len() - 1], "hrm").is_none());
        assert!(ParsedApiKey::parse(&format!("{}_", &*key), "hrm").is_none());
        assert!(ParsedApiKey::parse(&key.replace("hrm_", "hrm_zz"), "hrm").is_none());
    }
}
