mod common;

use async_trait::async_trait;
use hermes::crypto::{EncryptedSecretRecord, MasterKey, MasterKeySet, SecretKind};
use hermes::models::UserRole;
use hermes::services::{
    KeyRotator, NewEmailBot, RotationError, SecretCursor, SecretStore, StoreError, UserService,
};
use hermes::state::SharedState;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

async fn create_bots(state: &SharedState, owner: &str, count: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..count {
        let id = state
            .email_bots
            .create(
                owner,
                NewEmailBot {
                    sender_email: format!("bot{i}@example.com"),
                    app_password: Zeroizing::new(format!("password-{i}")),
                    display_name: None,
                    smtp_server: None,
                    smtp_port: None,
                },
            )
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

fn keyring_path(state: &SharedState) -> PathBuf {
    state.key_source.writable_path().unwrap().to_path_buf()
}

#[tokio::test]
async fn test_rotate_migrates_every_record_and_retires_old_key() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    let bots = create_bots(state, &alice, 3).await;

    assert_eq!(state.crypto.current_version(), 1);
    let summary = state
        .key_rotator()
        .rotate(MasterKey::generate(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.from_versions, vec![1]);
    assert_eq!(summary.to_version, 2);
    assert_eq!(summary.migrated, 6);
    assert_eq!(summary.retired, vec![1]);

    assert_eq!(state.crypto.versions(), vec![2]);
    assert_eq!(state.secrets.versions_in_use().await.unwrap(), vec![(2, 6)]);

    for (i, bot_id) in bots.iter().enumerate() {
        let creds = state.email_bots.decrypt_for_send(bot_id).await.unwrap();
        assert_eq!(creds.sender_email, format!("bot{i}@example.com"));
        assert_eq!(creds.app_password.as_str(), format!("password-{i}"));
    }

    let on_disk = MasterKeySet::load_from_file(&keyring_path(state)).unwrap();
    assert_eq!(on_disk.versions(), vec![2]);
}

#[tokio::test]
async fn test_rotation_is_idempotent() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    create_bots(state, &alice, 2).await;

    let rotator = state.key_rotator();
    let cancel = CancellationToken::new();
    rotator.rotate(MasterKey::generate(), &cancel).await.unwrap();

    let again = rotator.resume(&cancel).await.unwrap();
    assert!(again.is_complete());
    assert_eq!(again.migrated, 0);
    assert!(again.from_versions.is_empty());

    let second = rotator.rotate(MasterKey::generate(), &cancel).await.unwrap();
    assert_eq!(second.to_version, 3);
    assert_eq!(second.migrated, 4);
    assert_eq!(state.secrets.versions_in_use().await.unwrap(), vec![(3, 4)]);
}

#[tokio::test]
async fn test_interrupted_rotation_resumes_after_restart() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    let bots = create_bots(state, &alice, 2).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = state
        .key_rotator()
        .rotate(MasterKey::generate(), &cancel)
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert!(!summary.is_complete());
    assert_eq!(summary.migrated, 0);
    assert!(summary.retired.is_empty());

    // The new generation was persisted before any record moved.
    let on_disk = MasterKeySet::load_from_file(&keyring_path(state)).unwrap();
    assert_eq!(on_disk.versions(), vec![1, 2]);

    // A fresh process over the same files.
    let config = (*state.config).clone();
    let restarted = SharedState::with_transport(config, env.mail.clone())
        .await
        .unwrap();
    assert_eq!(restarted.crypto.current_version(), 2);

    let resumed = restarted
        .key_rotator()
        .resume(&CancellationToken::new())
        .await
        .unwrap();
    assert!(resumed.is_complete());
    assert_eq!(resumed.migrated, 4);
    assert_eq!(resumed.retired, vec![1]);

    for bot_id in &bots {
        assert!(restarted.email_bots.decrypt_for_send(bot_id).await.is_ok());
    }
}

#[tokio::test]
async fn test_undecryptable_record_is_skipped_and_blocks_retirement() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    let bots = create_bots(state, &alice, 2).await;

    let mut tampered = state
        .secrets
        .get(&bots[0], SecretKind::BotPassword)
        .await
        .unwrap();
    tampered.ciphertext[0] ^= 0xff;
    state.secrets.put(&tampered).await.unwrap();

    let rotator = state.key_rotator();
    let summary = rotator
        .rotate(MasterKey::generate(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!summary.is_complete());
    assert_eq!(summary.migrated, 3);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].owner_id, bots[0]);
    assert_eq!(summary.skipped[0].kind, SecretKind::BotPassword);
    assert_eq!(summary.skipped[0].key_version, 1);
    assert!(summary.retired.is_empty());
    assert_eq!(state.crypto.versions(), vec![1, 2]);

    assert!(matches!(
        rotator.retire(1).await,
        Err(RotationError::RecordsRemaining {
            version: 1,
            remaining: 1
        })
    ));
}

#[tokio::test]
async fn test_retire_refuses_current_and_unknown_versions() {
    let env = common::spawn_env().await;
    let rotator = env.state.key_rotator();

    assert!(matches!(
        rotator.retire(1).await,
        Err(RotationError::RetireCurrent(1))
    ));
    assert!(matches!(
        rotator.retire(7).await,
        Err(RotationError::UnknownVersion(7))
    ));
}

#[tokio::test]
async fn test_status_reports_histogram() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    create_bots(state, &alice, 2).await;

    let status = state.key_rotator().status().await.unwrap();
    assert_eq!(status.current_version, 1);
    assert_eq!(status.loaded_versions, vec![1]);
    assert_eq!(status.records_by_version, vec![(1, 4)]);
}

/// What the wrapper does the first time the rotator touches the store.
enum Interference {
    /// Delete the user owning the first listed bot right after the first batch is read.
    DeleteOwner {
        users: Arc<dyn UserService>,
        owners: HashMap<String, String>,
        deleted: Mutex<Option<String>>,
    },
    /// Rewrite the record under the current key just before the rotator swaps it.
    ConcurrentWrite { crypto: Arc<hermes::crypto::CryptoBox> },
}

struct InterferingStore {
    inner: Arc<dyn SecretStore>,
    interference: Interference,
    fired: AtomicBool,
}

#[async_trait]
impl SecretStore for InterferingStore {
    async fn put(&self, record: &EncryptedSecretRecord) -> Result<(), StoreError> {
        self.inner.put(record).await
    }

    async fn get(
        &self,
        owner_id: &str,
        kind: SecretKind,
    ) -> Result<EncryptedSecretRecord, StoreError> {
        self.inner.get(owner_id, kind).await
    }

    async fn list_by_key_version(
        &self,
        version: u32,
        after: Option<&SecretCursor>,
        limit: u64,
    ) -> Result<Vec<EncryptedSecretRecord>, StoreError> {
        let batch = self.inner.list_by_key_version(version, after, limit).await?;
        if let Interference::DeleteOwner {
            users,
            owners,
            deleted,
        } = &self.interference
            && let Some(first) = batch.first()
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            let user_id = owners[&first.owner_id].clone();
            users.delete_user(&user_id).await.unwrap();
            *deleted.lock().unwrap() = Some(user_id);
        }
        Ok(batch)
    }

    async fn count_by_key_version(&self, version: u32) -> Result<u64, StoreError> {
        self.inner.count_by_key_version(version).await
    }

    async fn versions_in_use(&self) -> Result<Vec<(u32, u64)>, StoreError> {
        self.inner.versions_in_use().await
    }

    async fn replace(
        &self,
        owner_id: &str,
        kind: SecretKind,
        expected_version: u32,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError> {
        self.inner.replace(owner_id, kind, expected_version, new).await
    }

    async fn replace_if_unchanged(
        &self,
        current: &EncryptedSecretRecord,
        new: &EncryptedSecretRecord,
    ) -> Result<(), StoreError> {
        if let Interference::ConcurrentWrite { crypto } = &self.interference
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            let rewritten = crypto
                .encrypt(&current.owner_id, current.kind, b"changed@example.com")
                .unwrap();
            self.inner.put(&rewritten).await?;
        }
        self.inner.replace_if_unchanged(current, new).await
    }

    async fn delete(&self, owner_id: &str, kind: SecretKind) -> Result<bool, StoreError> {
        self.inner.delete(owner_id, kind).await
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<u64, StoreError> {
        self.inner.delete_owner(owner_id).await
    }
}

#[tokio::test]
async fn test_user_deleted_mid_rotation_counts_as_vanished() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    let (bob, _) = common::approved_user(state, "Bob", "bob@example.com", UserRole::User).await;

    let mut owners = HashMap::new();
    for bot_id in create_bots(state, &alice, 2).await {
        owners.insert(bot_id, alice.clone());
    }
    for bot_id in create_bots(state, &bob, 1).await {
        owners.insert(bot_id, bob.clone());
    }

    let store = Arc::new(InterferingStore {
        inner: state.secrets.clone(),
        interference: Interference::DeleteOwner {
            users: state.users.clone(),
            owners,
            deleted: Mutex::new(None),
        },
        fired: AtomicBool::new(false),
    });
    let rotator = KeyRotator::new(
        state.crypto.clone(),
        store.clone(),
        &state.config.rotation,
        None,
    );

    let summary = rotator
        .rotate(MasterKey::generate(), &CancellationToken::new())
        .await
        .unwrap();

    let Interference::DeleteOwner { deleted, .. } = &store.interference else {
        unreachable!()
    };
    let deleted = deleted.lock().unwrap().clone().unwrap();
    let survivor = if deleted == alice { &bob } else { &alice };

    // The first batch holds both records of one bot, which are gone by the time they are swapped.
    assert!(summary.is_complete(), "{summary:?}");
    assert_eq!(summary.vanished, 2);
    assert_eq!(summary.retired, vec![1]);

    let surviving_bots = state.email_bots.list(survivor).await.unwrap();
    assert_eq!(summary.migrated, 2 * surviving_bots.len() as u64);
    assert_eq!(
        state.secrets.versions_in_use().await.unwrap(),
        vec![(2, summary.migrated)]
    );
    for bot in surviving_bots {
        assert!(state.email_bots.decrypt_for_send(&bot.id).await.is_ok());
    }
}

#[tokio::test]
async fn test_concurrent_writer_is_never_clobbered() {
    let env = common::spawn_env().await;
    let state = &env.state;
    let (alice, _) =
        common::approved_user(state, "Alice", "alice@example.com", UserRole::User).await;
    create_bots(state, &alice, 1).await;

    let store = Arc::new(InterferingStore {
        inner: state.secrets.clone(),
        interference: Interference::ConcurrentWrite {
            crypto: state.crypto.clone(),
        },
        fired: AtomicBool::new(false),
    });
    let rotator = KeyRotator::new(state.crypto.clone(), store, &state.config.rotation, None);

    let summary = rotator
        .rotate(MasterKey::generate(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.already_current, 1);
    assert_eq!(summary.migrated, 1);

    // The concurrent write survives the rotation.
    let bots = state.email_bots.list(&alice).await.unwrap();
    assert_eq!(bots.len(), 1);
    let mut rewritten = 0;
    for kind in SecretKind::ALL {
        let record = state.secrets.get(&bots[0].id, kind).await.unwrap();
        assert_eq!(record.key_version, 2);
        if state.crypto.decrypt_string(&record).unwrap().as_str() == "changed@example.com" {
            rewritten += 1;
        }
    }
    assert_eq!(rewritten, 1);
}
