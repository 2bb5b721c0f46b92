//! `SeaORM` implementation of the `ApiKeyManager` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::CryptoBox;
use crate::db::{Store, WriteOutcome};
use crate::models::{ApiKey, ApiKeyState};
use crate::services::api_key_manager::{
    ApiKeyError, ApiKeyManager, IssuedApiKey, ParsedApiKey, VerifiedApiKey, generate_api_key,
};

pub struct SeaOrmApiKeyManager {
    store: Store,
    crypto: Arc<CryptoBox>,
    key_tag: String,
}

impl SeaOrmApiKeyManager {
    #[must_use]
    pub fn new(store: Store, crypto: Arc<CryptoBox>, key_tag: impl Into<String>) -> Self {
        Self {
            store,
            crypto,
            key_tag: key_tag.into(),
        }
    }

    async fn transition(
        &self,
        key_id: &str,
        from: &[ApiKeyState],
        to: ApiKeyState,
    ) -> Result<ApiKey, ApiKeyError> {
        if self.store.transition_api_key(key_id, from, to).await? {
            info!(key_id, state = %to, "API key state changed");
            return self.get(key_id).await;
        }

        // The conditional update missed: work out why.
        match self.store.get_api_key(key_id).await? {
            None => Err(ApiKeyError::NotFound),
            Some(current) => Err(ApiKeyError::InvalidStateTransition {
                from: current.state,
                to,
            }),
        }
    }

    /// Burns one Argon2 verification so rejected keys cost as much as real ones.
    async fn equalize_timing(&self, presented: String) {
        let crypto = self.crypto.clone();
        let _ = task::spawn_blocking(move || crypto.verify_dummy(&presented)).await;
    }

    fn record_verification(outcome: &'static str) {
        metrics::counter!("hermes_api_key_verifications_total", "outcome" => outcome).increment(1);
    }
}

#[async_trait]
impl ApiKeyManager for SeaOrmApiKeyManager {
    async fn issue_pending(&self, user_id: &str) -> Result<IssuedApiKey, ApiKeyError> {
        if self.store.live_api_key_for_user(user_id).await?.is_some() {
            return Err(ApiKeyError::AlreadyPending);
        }

        let (lookup, plaintext) = generate_api_key(&self.key_tag);

        let crypto = self.crypto.clone();
        let to_hash = plaintext.clone();
        let key_hash = task::spawn_blocking(move || crypto.hash_for_verification(&to_hash))
            .await
            .map_err(|e| ApiKeyError::Internal(format!("Hashing task panicked: {e}")))??;

        let now = chrono::Utc::now().to_rfc3339();
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            key_prefix: lookup,
            key_hash,
            state: ApiKeyState::Pending,
            key_version: self.crypto.current_version(),
            created_at: now.clone(),
            updated_at: now,
        };

        // The partial unique index catches a concurrent issue that slipped past the check above.
        match self.store.insert_api_key(&key).await? {
            WriteOutcome::Applied => {}
            WriteOutcome::Duplicate | WriteOutcome::NotFound => {
                return Err(ApiKeyError::AlreadyPending);
            }
        }

        info!(key_id = %key.id, user_id, "Issued pending API key");
        Ok(IssuedApiKey { key, plaintext })
    }

    async fn approve(&self, key_id: &str) -> Result<ApiKey, ApiKeyError> {
        self.transition(key_id, &[ApiKeyState::Pending], ApiKeyState::Active)
            .await
    }

    async fn reject(&self, key_id: &str) -> Result<ApiKey, ApiKeyError> {
        self.transition(key_id, &[ApiKeyState::Pending], ApiKeyState::Rejected)
            .await
    }

    async fn revoke(&self, key_id: &str) -> Result<ApiKey, ApiKeyError> {
        self.transition(key_id, &ApiKeyState::LIVE, ApiKeyState::Revoked)
            .await
    }

    async fn verify(&self, presented: &str) -> Result<VerifiedApiKey, ApiKeyError> {
        let Some(parsed) = ParsedApiKey::parse(presented, &self.key_tag) else {
            self.equalize_timing(presented.to_string()).await;
            Self::record_verification("malformed");
            return Err(ApiKeyError::InvalidKey);
        };

        let candidates = self.store.active_api_keys_by_prefix(parsed.lookup).await?;

        let crypto = self.crypto.clone();
        let presented = presented.to_string();
        let matched = task::spawn_blocking(move || {
            if candidates.is_empty() {
                crypto.verify_dummy(&presented);
                return None;
            }
            candidates
                .into_iter()
                .find(|candidate| crypto.verify(&presented, &candidate.key_hash))
        })
        .await
        .map_err(|e| ApiKeyError::Internal(format!("Verification task panicked: {e}")))?;

        if let Some(key) = matched {
            Self::record_verification("valid");
            Ok(VerifiedApiKey {
                key_id: key.id,
                user_id: key.user_id,
            })
        } else {
            debug!(lookup = parsed.lookup, "API key verification failed");
            Self::record_verification("invalid");
            Err(ApiKeyError::InvalidKey)
        }
    }

    async fn get(&self, key_id: &str) -> Result<ApiKey, ApiKeyError> {
        self.store
            .get_api_key(key_id)
            .await?
            .ok_or(ApiKeyError::NotFound)
    }

    async fn live_key_for_user(&self, user_id: &str) -> Result<Option<ApiKey>, ApiKeyError> {
        Ok(self.store.live_api_key_for_user(user_id).await?)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>, ApiKeyError> {
        Ok(self.store.list_api_keys_for_user(user_id).await?)
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, ApiKeyError> {
        let revoked = self
            .store
            .transition_api_keys_for_user(user_id, &ApiKeyState::LIVE, ApiKeyState::Revoked)
            .await?;
        if revoked > 0 {
            info!(user_id, revoked, "Revoked API keys for user");
        }
        Ok(revoked)
    }
}
