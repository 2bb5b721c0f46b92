//! Persistence contract for encrypted secrets.
//!
//! Records are keyed by `(owner_id, kind)`. Writers that must not clobber a
//! concurrent change use the compare-and-swap operations.

use thiserror::Error;

use crate::crypto::{EncryptedSecretRecord, SecretKind};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Secret not found")]
    NotFound,

    #[error("Secret was modified concurrently, please retry")]
    Conflict,

    #[error("Replacement record does not match {owner_id}/{kind}")]
    KeyMismatch { owner_id: String, kind: SecretKind },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// Position in a `(owner_id, kind)` ordered scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretCursor {
    pub owner_id: String,
    pub kind: SecretKind,
}

impl From<&EncryptedSecretRecord> for SecretCursor {
    fn from(record: &EncryptedSecretRecord) -> Self {
        Self {
            owner_id: record.owner_id.clone(),
            kind: record.kind,
        }
    }
}

#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Inserts or overwrites the record for `(owner_id, kind)`.
    async fn put(&self, record: &EncryptedSecretRecord) -> Result<(), StoreError>;

    async fn get(&self, owner_id: &str, kind: SecretKind)
    -> Result<EncryptedSecretRecord, StoreError>;

    /// Up to `limit` records at `version`, ordered by `(owner_id, kind)`, strictly after `after`.
    async fn list_by_key_version(
        &self,
        version: u32,
        after: Option<&SecretCursor>,
        limit: u64,
    ) -> Result<Vec<EncryptedSecretRecord>, StoreError>;

    async fn count_by_key_version(&self, version: u32) -> Result<u64, StoreError>;

    /// `(version, records)` for every key version still referenced by a record.
    async fn versions_in_use(&self) -> Result<Vec<(u32, u64)>, StoreError>;

    /// Replaces the record only if it is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the stored version differs, [`StoreError::NotFound`]
    /// when the record is gone.
    async fn replace(
        &self,
        owner_id: &str,
        kind: SecretKind,
        expected_version: u32,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError>;

    /// Replaces the record only if it is byte-for-byte the one previously read
    /// (same version and nonce). Nonces are unique per encryption, so any
    /// intervening write is detected.
    async fn replace_if_unchanged(
        &self,
        current: &EncryptedSecretRecord,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError>;

    async fn delete(&self, owner_id: &str, kind: SecretKind) -> Result<bool, StoreError>;

    /// Removes every record of `owner_id`, returning how many were deleted.
    async fn delete_owner(&self, owner_id: &str) -> Result<u64, StoreError>;
}
