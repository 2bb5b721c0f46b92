use anyhow::{Context, Result};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::crypto::{EncryptedSecretRecord, SecretKind};
use crate::entities::{encrypted_secrets, prelude::*};

pub struct SecretRepository {
    conn: DatabaseConnection,
}

impl SecretRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(model: encrypted_secrets::Model) -> Result<EncryptedSecretRecord> {
        let kind = model
            .kind
            .parse::<SecretKind>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Corrupt secret kind for owner {}", model.owner_id))?;
        let key_version = u32::try_from(model.key_version)
            .with_context(|| format!("Corrupt key version for owner {}", model.owner_id))?;

        Ok(EncryptedSecretRecord {
            owner_id: model.owner_id,
            kind,
            ciphertext: model.ciphertext,
            nonce: model.nonce,
            key_version,
        })
    }

    fn version_value(version: u32) -> Result<i32> {
        i32::try_from(version).context("Key version out of range")
    }

    pub async fn upsert(&self, record: &EncryptedSecretRecord) -> Result<()> {
        let active = encrypted_secrets::ActiveModel {
            owner_id: Set(record.owner_id.clone()),
            kind: Set(record.kind.as_str().to_string()),
            ciphertext: Set(record.ciphertext.clone()),
            nonce: Set(record.nonce.clone()),
            key_version: Set(Self::version_value(record.key_version)?),
            updated_at: Set(chrono::Utc::now().to_rfc3339()),
        };

        EncryptedSecrets::insert(active)
            .on_conflict(
                OnConflict::columns([
                    encrypted_secrets::Column::OwnerId,
                    encrypted_secrets::Column::Kind,
                ])
                .update_columns([
                    encrypted_secrets::Column::Ciphertext,
                    encrypted_secrets::Column::Nonce,
                    encrypted_secrets::Column::KeyVersion,
                    encrypted_secrets::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to upsert secret")?;

        Ok(())
    }

    pub async fn get(&self, owner_id: &str, kind: SecretKind) -> Result<Option<EncryptedSecretRecord>> {
        EncryptedSecrets::find_by_id((owner_id.to_string(), kind.as_str().to_string()))
            .one(&self.conn)
            .await
            .context("Failed to query secret")?
            .map(Self::map_model)
            .transpose()
    }

    /// Keyset page of records at `version`, ordered by `(owner_id, kind)` and
    /// starting strictly after `after`.
    pub async fn list_by_key_version(
        &self,
        version: u32,
        after: Option<(&str, SecretKind)>,
        limit: u64,
    ) -> Result<Vec<EncryptedSecretRecord>> {
        let mut query = EncryptedSecrets::find()
            .filter(encrypted_secrets::Column::KeyVersion.eq(Self::version_value(version)?));

        if let Some((owner_id, kind)) = after {
            query = query.filter(
                Condition::any()
                    .add(encrypted_secrets::Column::OwnerId.gt(owner_id))
                    .add(
                        Condition::all()
                            .add(encrypted_secrets::Column::OwnerId.eq(owner_id))
                            .add(encrypted_secrets::Column::Kind.gt(kind.as_str())),
                    ),
            );
        }

        query
            .order_by_asc(encrypted_secrets::Column::OwnerId)
            .order_by_asc(encrypted_secrets::Column::Kind)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list secrets by key version")?
            .into_iter()
            .map(Self::map_model)
            .collect()
    }

    pub async fn count_by_key_version(&self, version: u32) -> Result<u64> {
        EncryptedSecrets::find()
            .filter(encrypted_secrets::Column::KeyVersion.eq(Self::version_value(version)?))
            .count(&self.conn)
            .await
            .context("Failed to count secrets by key version")
    }

    /// `(key_version, record count)` for every version still referenced.
    pub async fn version_histogram(&self) -> Result<Vec<(u32, u64)>> {
        let rows: Vec<(i32, i64)> = EncryptedSecrets::find()
            .select_only()
            .column(encrypted_secrets::Column::KeyVersion)
            .column_as(Expr::col(encrypted_secrets::Column::OwnerId).count(), "records")
            .group_by(encrypted_secrets::Column::KeyVersion)
            .order_by_asc(encrypted_secrets::Column::KeyVersion)
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to group secrets by key version")?;

        rows.into_iter()
            .map(|(version, count)| {
                Ok((
                    u32::try_from(version).context("Corrupt key version")?,
                    u64::try_from(count).unwrap_or_default(),
                ))
            })
            .collect()
    }

    /// Overwrites the record only while it still carries `expected_version` (and
    /// `expected_nonce`, when given). Returns whether a row was replaced.
    pub async fn compare_and_swap(
        &self,
        expected_version: u32,
        expected_nonce: Option<&[u8]>,
        new: &EncryptedSecretRecord,
    ) -> Result<bool> {
        let mut update = EncryptedSecrets::update_many()
            .col_expr(
                encrypted_secrets::Column::Ciphertext,
                Expr::value(new.ciphertext.clone()),
            )
            .col_expr(encrypted_secrets::Column::Nonce, Expr::value(new.nonce.clone()))
            .col_expr(
                encrypted_secrets::Column::KeyVersion,
                Expr::value(Self::version_value(new.key_version)?),
            )
            .col_expr(
                encrypted_secrets::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(encrypted_secrets::Column::OwnerId.eq(new.owner_id.as_str()))
            .filter(encrypted_secrets::Column::Kind.eq(new.kind.as_str()))
            .filter(encrypted_secrets::Column::KeyVersion.eq(Self::version_value(expected_version)?));

        if let Some(nonce) = expected_nonce {
            update = update.filter(encrypted_secrets::Column::Nonce.eq(nonce.to_vec()));
        }

        let result = update
            .exec(&self.conn)
            .await
            .context("Failed to replace secret")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn delete(&self, owner_id: &str, kind: SecretKind) -> Result<bool> {
        let result = EncryptedSecrets::delete_by_id((owner_id.to_string(), kind.as_str().to_string()))
            .exec(&self.conn)
            .await
            .context("Failed to delete secret")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_owner(&self, owner_id: &str) -> Result<u64> {
        let result = EncryptedSecrets::delete_many()
            .filter(encrypted_secrets::Column::OwnerId.eq(owner_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete secrets for owner")?;
        Ok(result.rows_affected)
    }
}
