//! Master key rotation.
//!
//! A rotation registers a new generation, re-encrypts every record still
//! under an older generation and retires the old generations once nothing
//! references them. Every step is idempotent, so an interrupted run is
//! finished by [`KeyRotator::resume`].

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RotationConfig;
use crate::crypto::{CryptoBox, CryptoError, EncryptedSecretRecord, MasterKey, SecretKind};
use crate::services::secret_store::{SecretCursor, SecretStore, StoreError};

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("Key version {0} is current and cannot be retired")]
    RetireCurrent(u32),

    #[error("Key version {version} still protects {remaining} records")]
    RecordsRemaining { version: u32, remaining: u64 },

    #[error("Key version {0} is not loaded")]
    UnknownVersion(u32),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Secret store error: {0}")]
    Store(#[from] StoreError),
}

/// A record the rotator had to leave at its old version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub owner_id: String,
    pub kind: SecretKind,
    pub key_version: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationSummary {
    pub from_versions: Vec<u32>,
    pub to_version: u32,
    pub migrated: u64,
    pub already_current: u64,
    /// Records deleted while the rotation was running.
    pub vanished: u64,
    pub skipped: Vec<SkippedRecord>,
    pub retired: Vec<u32>,
    pub cancelled: bool,
}

impl RotationSummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub current_version: u32,
    pub loaded_versions: Vec<u32>,
    /// `(version, records)` for every version still referenced.
    pub records_by_version: Vec<(u32, u64)>,
}

enum RecordOutcome {
    Migrated,
    AlreadyCurrent,
    Vanished,
    Skipped(String),
}

impl RecordOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Migrated => "migrated",
            Self::AlreadyCurrent => "already_current",
            Self::Vanished => "vanished",
            Self::Skipped(_) => "skipped",
        }
    }
}

pub struct KeyRotator {
    crypto: Arc<CryptoBox>,
    secrets: Arc<dyn SecretStore>,
    batch_size: u64,
    max_conflict_retries: u32,
    keyring_path: Option<PathBuf>,
}

impl KeyRotator {
    #[must_use]
    pub fn new(
        crypto: Arc<CryptoBox>,
        secrets: Arc<dyn SecretStore>,
        config: &RotationConfig,
        keyring_path: Option<PathBuf>,
    ) -> Self {
        Self {
            crypto,
            secrets,
            batch_size: config.batch_size.max(1),
            max_conflict_retries: config.max_conflict_retries,
            keyring_path,
        }
    }

    pub async fn status(&self) -> Result<KeyStatus, RotationError> {
        Ok(KeyStatus {
            current_version: self.crypto.current_version(),
            loaded_versions: self.crypto.versions(),
            records_by_version: self.secrets.versions_in_use().await?,
        })
    }

    /// Registers `new_key` as the current generation, migrates everything onto it
    /// and retires the older generations if the migration left nothing behind.
    ///
    /// The keyring file is rewritten before any record is touched, so a crash
    /// mid-run never leaves ciphertext under a key that was not saved.
    pub async fn rotate(
        &self,
        new_key: MasterKey,
        cancel: &CancellationToken,
    ) -> Result<RotationSummary, RotationError> {
        let from_versions = self.crypto.versions();
        let to_version = self
            .crypto
            .register(new_key, self.keyring_path.as_deref())?;
        info!(to_version, ?from_versions, "Registered new master key generation");

        self.migrate_versions(from_versions, to_version, cancel)
            .await
    }

    /// Finishes an interrupted rotation onto the current generation.
    pub async fn resume(&self, cancel: &CancellationToken) -> Result<RotationSummary, RotationError> {
        let to_version = self.crypto.current_version();

        let mut from_versions: Vec<u32> = self
            .crypto
            .versions()
            .into_iter()
            .filter(|v| *v != to_version)
            .collect();
        for (version, _) in self.secrets.versions_in_use().await? {
            if version != to_version && !from_versions.contains(&version) {
                from_versions.push(version);
            }
        }
        from_versions.sort_unstable();

        info!(to_version, ?from_versions, "Resuming key rotation");
        self.migrate_versions(from_versions, to_version, cancel)
            .await
    }

    /// Re-encrypts every record still at `from_version` onto the current generation.
    pub async fn migrate(
        &self,
        from_version: u32,
        cancel: &CancellationToken,
    ) -> Result<RotationSummary, RotationError> {
        let to_version = self.crypto.current_version();
        let mut summary = RotationSummary {
            from_versions: vec![from_version],
            to_version,
            ..RotationSummary::default()
        };
        self.migrate_version(from_version, to_version, cancel, &mut summary)
            .await?;
        Ok(summary)
    }

    /// Removes a non-current generation that no record references any more.
    pub async fn retire(&self, version: u32) -> Result<(), RotationError> {
        if version == self.crypto.current_version() {
            return Err(RotationError::RetireCurrent(version));
        }
        if !self.crypto.has_version(version) {
            return Err(RotationError::UnknownVersion(version));
        }

        let remaining = self.secrets.count_by_key_version(version).await?;
        if remaining > 0 {
            return Err(RotationError::RecordsRemaining { version, remaining });
        }

        self.crypto
            .retire(version, self.keyring_path.as_deref())?;
        info!(version, "Retired master key generation");
        Ok(())
    }

    async fn migrate_versions(
        &self,
        from_versions: Vec<u32>,
        to_version: u32,
        cancel: &CancellationToken,
    ) -> Result<RotationSummary, RotationError> {
        let mut summary = RotationSummary {
            from_versions: from_versions.clone(),
            to_version,
            ..RotationSummary::default()
        };

        for version in &from_versions {
            self.migrate_version(*version, to_version, cancel, &mut summary)
                .await?;
            if summary.cancelled {
                break;
            }
        }

        if summary.is_complete() {
            for version in from_versions {
                if !self.crypto.has_version(version) {
                    continue;
                }
                match self.retire(version).await {
                    Ok(()) => summary.retired.push(version),
                    // A writer slipped a record in under the old key; the next resume picks it up.
                    Err(RotationError::RecordsRemaining { version, remaining }) => {
                        warn!(version, remaining, "Key generation still in use, not retired");
                    }
                    Err(e) => return Err(e),
                }
            }
        } else {
            warn!(
                skipped = summary.skipped.len(),
                cancelled = summary.cancelled,
                "Rotation incomplete, old key generations kept"
            );
        }

        info!(
            to_version,
            migrated = summary.migrated,
            already_current = summary.already_current,
            vanished = summary.vanished,
            skipped = summary.skipped.len(),
            retired = ?summary.retired,
            "Key rotation finished"
        );
        Ok(summary)
    }

    async fn migrate_version(
        &self,
        from_version: u32,
        to_version: u32,
        cancel: &CancellationToken,
        summary: &mut RotationSummary,
    ) -> Result<(), RotationError> {
        if from_version == to_version {
            return Ok(());
        }

        let mut cursor: Option<SecretCursor> = None;
        loop {
            if cancel.is_cancelled() {
                info!(from_version, "Key rotation cancelled");
                summary.cancelled = true;
                return Ok(());
            }

            let batch = self
                .secrets
                .list_by_key_version(from_version, cursor.as_ref(), self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                return Ok(());
            };
            cursor = Some(SecretCursor::from(last));
            debug!(from_version, records = batch.len(), "Migrating batch");

            for record in &batch {
                let outcome = self.migrate_record(record, to_version).await?;
                metrics::counter!("hermes_rotation_records_total", "outcome" => outcome.label())
                    .increment(1);

                match outcome {
                    RecordOutcome::Migrated => summary.migrated += 1,
                    RecordOutcome::AlreadyCurrent => summary.already_current += 1,
                    RecordOutcome::Vanished => summary.vanished += 1,
                    RecordOutcome::Skipped(reason) => {
                        warn!(
                            owner_id = %record.owner_id,
                            kind = %record.kind,
                            key_version = record.key_version,
                            %reason,
                            "Skipping record during key rotation"
                        );
                        summary.skipped.push(SkippedRecord {
                            owner_id: record.owner_id.clone(),
                            kind: record.kind,
                            key_version: record.key_version,
                            reason,
                        });
                    }
                }
            }
        }
    }

    /// Decrypt, re-encrypt and swap one record, re-reading it when a concurrent
    /// writer got there first.
    async fn migrate_record(
        &self,
        record: &EncryptedSecretRecord,
        to_version: u32,
    ) -> Result<RecordOutcome, RotationError> {
        let mut current = record.clone();

        for _ in 0..=self.max_conflict_retries {
            if current.key_version == to_version {
                return Ok(RecordOutcome::AlreadyCurrent);
            }

            let replacement = match self.reencrypt(&current, to_version) {
                Ok(replacement) => replacement,
                Err(e) => return Ok(RecordOutcome::Skipped(e.to_string())),
            };

            match self
                .secrets
                .replace_if_unchanged(&current, &replacement)
                .await
            {
                Ok(()) => return Ok(RecordOutcome::Migrated),
                Err(StoreError::NotFound) => return Ok(RecordOutcome::Vanished),
                Err(StoreError::Conflict) => {
                    match self.secrets.get(&current.owner_id, current.kind).await {
                        Ok(fresh) => current = fresh,
                        Err(StoreError::NotFound) => return Ok(RecordOutcome::Vanished),
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(RecordOutcome::Skipped(format!(
            "record kept changing after {} attempts",
            self.max_conflict_retries + 1
        )))
    }

    fn reencrypt(
        &self,
        record: &EncryptedSecretRecord,
        to_version: u32,
    ) -> Result<EncryptedSecretRecord, CryptoError> {
        let plaintext = self.crypto.decrypt(record)?;
        self.crypto
            .encrypt_with_version(&record.owner_id, record.kind, &plaintext, to_version)
    }
}
