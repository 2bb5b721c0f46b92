//! `SeaORM` implementation of the `SecretStore` trait.

use async_trait::async_trait;

use crate::crypto::{EncryptedSecretRecord, SecretKind};
use crate::db::Store;
use crate::services::secret_store::{SecretCursor, SecretStore, StoreError};

pub struct SeaOrmSecretStore {
    store: Store,
}

impl SeaOrmSecretStore {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Turns a compare-and-swap miss into the precise error.
    async fn explain_miss(&self, owner_id: &str, kind: SecretKind) -> StoreError {
        match self.store.get_secret(owner_id, kind).await {
            Ok(Some(_)) => StoreError::Conflict,
            Ok(None) => StoreError::NotFound,
            Err(e) => e.into(),
        }
    }

    fn ensure_same_slot(
        owner_id: &str,
        kind: SecretKind,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError> {
        if new.owner_id == owner_id && new.kind == kind {
            Ok(())
        } else {
            Err(StoreError::KeyMismatch {
                owner_id: owner_id.to_string(),
                kind,
            })
        }
    }
}

#[async_trait]
impl SecretStore for SeaOrmSecretStore {
    async fn put(&self, record: &EncryptedSecretRecord) -> Result<(), StoreError> {
        self.store.upsert_secret(record).await?;
        Ok(())
    }

    async fn get(
        &self,
        owner_id: &str,
        kind: SecretKind,
    ) -> Result<EncryptedSecretRecord, StoreError> {
        self.store
            .get_secret(owner_id, kind)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn list_by_key_version(
        &self,
        version: u32,
        after: Option<&SecretCursor>,
        limit: u64,
    ) -> Result<Vec<EncryptedSecretRecord>, StoreError> {
        let after = after.map(|c| (c.owner_id.as_str(), c.kind));
        Ok(self
            .store
            .list_secrets_by_key_version(version, after, limit)
            .await?)
    }

    async fn count_by_key_version(&self, version: u32) -> Result<u64, StoreError> {
        Ok(self.store.count_secrets_by_key_version(version).await?)
    }

    async fn versions_in_use(&self) -> Result<Vec<(u32, u64)>, StoreError> {
        Ok(self.store.secret_version_histogram().await?)
    }

    async fn replace(
        &self,
        owner_id: &str,
        kind: SecretKind,
        expected_version: u32,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError> {
        Self::ensure_same_slot(owner_id, kind, new)?;

        if self
            .store
            .compare_and_swap_secret(expected_version, None, new)
            .await?
        {
            return Ok(());
        }
        Err(self.explain_miss(owner_id, kind).await)
    }

    async fn replace_if_unchanged(
        &self,
        current: &EncryptedSecretRecord,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError> {
        Self::ensure_same_slot(&current.owner_id, current.kind, new)?;

        if self
            .store
            .compare_and_swap_secret(current.key_version, Some(&current.nonce), new)
            .await?
        {
            return Ok(());
        }
        Err(self.explain_miss(&current.owner_id, current.kind).await)
    }

    async fn delete(&self, owner_id: &str, kind: SecretKind) -> Result<bool, StoreError> {
        Ok(self.store.delete_secret(owner_id, kind).await?)
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<u64, StoreError> {
        Ok(self.store.delete_secrets_for_owner(owner_id).await?)
    }
}
