//! `SeaORM` implementation of the `UserService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Store, WriteOutcome};
use crate::mail::Notifier;
use crate::models::{ApiKeyState, User, UserRole, UserStatus};
use crate::services::api_key_manager::{ApiKeyError, ApiKeyManager, IssuedApiKey};
use crate::services::email_bot_manager::EmailBotManager;
use crate::services::user_service::{
    Approval, DeletionReport, Registration, UserError, UserService, UserUpdate,
};
use crate::services::validation;

pub struct SeaOrmUserService {
    store: Store,
    api_keys: Arc<dyn ApiKeyManager>,
    email_bots: Arc<dyn EmailBotManager>,
    notifier: Arc<Notifier>,
}

impl SeaOrmUserService {
    #[must_use]
    pub fn new(
        store: Store,
        api_keys: Arc<dyn ApiKeyManager>,
        email_bots: Arc<dyn EmailBotManager>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            store,
            api_keys,
            email_bots,
            notifier,
        }
    }

    /// Inserts the user row and issues its first key, undoing the row if issuance fails.
    async fn insert_with_key(
        &self,
        name: &str,
        email: &str,
        role: UserRole,
    ) -> Result<Registration, UserError> {
        let name = validation::normalize_name(name).map_err(UserError::Validation)?;
        let email = validation::normalize_email(email).map_err(UserError::Validation)?;

        let now = chrono::Utc::now().to_rfc3339();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            role,
            status: UserStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        };

        match self.store.create_user(&user).await? {
            WriteOutcome::Applied => {}
            WriteOutcome::Duplicate | WriteOutcome::NotFound => {
                return Err(UserError::AlreadyExists);
            }
        }

        match self.api_keys.issue_pending(&user.id).await {
            Ok(api_key) => Ok(Registration { user, api_key }),
            Err(e) => {
                if let Err(cleanup) = self.store.delete_user(&user.id).await {
                    warn!(user_id = %user.id, error = %cleanup, "Failed to remove user after key issuance failed");
                }
                Err(e.into())
            }
        }
    }

    /// Why a conditional status update did not apply.
    async fn status_miss(&self, user_id: &str, wanted: UserStatus) -> UserError {
        match self.store.get_user(user_id).await {
            Ok(Some(user)) => UserError::InvalidState(format!(
                "cannot move user from {} to {}",
                user.status.as_str(),
                wanted.as_str()
            )),
            Ok(None) => UserError::NotFound,
            Err(e) => e.into(),
        }
    }

    async fn pending_key_id(&self, user_id: &str) -> Result<Option<String>, UserError> {
        Ok(self
            .api_keys
            .live_key_for_user(user_id)
            .await?
            .filter(|key| key.state == ApiKeyState::Pending)
            .map(|key| key.id))
    }
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn register(&self, name: &str, email: &str) -> Result<Registration, UserError> {
        let registration = self.insert_with_key(name, email, UserRole::User).await?;
        info!(user_id = %registration.user.id, "User registered");

        match self.store.list_users_by_role(UserRole::Admin).await {
            Ok(admins) => {
                self.notifier
                    .user_registered(&registration.user, &admins)
                    .await;
            }
            Err(e) => warn!(error = %e, "Could not load admins for registration notice"),
        }

        Ok(registration)
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        role: UserRole,
        approved: bool,
    ) -> Result<Registration, UserError> {
        let mut registration = self.insert_with_key(name, email, role).await?;

        if approved {
            self.store
                .transition_user_status(
                    &registration.user.id,
                    &[UserStatus::Pending],
                    UserStatus::Approved,
                )
                .await?;
            registration.api_key.key = self.api_keys.approve(&registration.api_key.key.id).await?;
            registration.user = self.get(&registration.user.id).await?;
        }

        info!(user_id = %registration.user.id, role = role.as_str(), approved, "User created");
        Ok(registration)
    }

    async fn get(&self, user_id: &str) -> Result<User, UserError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        let email = email.trim().to_ascii_lowercase();
        self.store
            .get_user_by_email(&email)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn list(&self) -> Result<Vec<User>, UserError> {
        Ok(self.store.list_users().await?)
    }

    async fn update(&self, user_id: &str, update: UserUpdate) -> Result<User, UserError> {
        let name = update
            .name
            .as_deref()
            .map(validation::normalize_name)
            .transpose()
            .map_err(UserError::Validation)?;
        let email = update
            .email
            .as_deref()
            .map(validation::normalize_email)
            .transpose()
            .map_err(UserError::Validation)?;

        match self
            .store
            .update_user(user_id, name.as_deref(), email.as_deref(), update.role)
            .await?
        {
            WriteOutcome::Applied => {}
            WriteOutcome::NotFound => return Err(UserError::NotFound),
            WriteOutcome::Duplicate => return Err(UserError::AlreadyExists),
        }

        info!(user_id, "User updated");
        self.get(user_id).await
    }

    async fn approve_user(&self, user_id: &str) -> Result<Approval, UserError> {
        if !self
            .store
            .transition_user_status(user_id, &[UserStatus::Pending], UserStatus::Approved)
            .await?
        {
            return Err(self.status_miss(user_id, UserStatus::Approved).await);
        }

        let api_key = match self.pending_key_id(user_id).await? {
            Some(key_id) => Some(self.api_keys.approve(&key_id).await?),
            None => None,
        };

        let user = self.get(user_id).await?;
        info!(user_id, "User approved");
        self.notifier.user_approved(&user).await;

        Ok(Approval { user, api_key })
    }

    async fn reject_user(&self, user_id: &str) -> Result<User, UserError> {
        if !self
            .store
            .transition_user_status(user_id, &[UserStatus::Pending], UserStatus::Rejected)
            .await?
        {
            return Err(self.status_miss(user_id, UserStatus::Rejected).await);
        }

        if let Some(key_id) = self.pending_key_id(user_id).await? {
            self.api_keys.reject(&key_id).await?;
        }

        info!(user_id, "User rejected");
        self.get(user_id).await
    }

    async fn reissue_api_key(&self, user_id: &str) -> Result<IssuedApiKey, UserError> {
        let user = self.get(user_id).await?;
        if user.status == UserStatus::Rejected {
            return Err(UserError::InvalidState(
                "rejected users cannot hold API keys".to_string(),
            ));
        }

        if let Some(current) = self.api_keys.live_key_for_user(user_id).await? {
            match self.api_keys.revoke(&current.id).await {
                // Someone else revoked it first; either way it is gone.
                Ok(_) | Err(ApiKeyError::InvalidStateTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut issued = self.api_keys.issue_pending(user_id).await?;
        if user.status == UserStatus::Approved {
            issued.key = self.api_keys.approve(&issued.key.id).await?;
        }

        info!(user_id, key_id = %issued.key.id, "API key reissued");
        Ok(issued)
    }

    async fn delete_user(&self, user_id: &str) -> Result<DeletionReport, UserError> {
        self.get(user_id).await?;

        // Keys first so the user can no longer act while the rest is torn down.
        let revoked_keys = self.api_keys.revoke_all_for_user(user_id).await?;
        let deleted_bots = self.email_bots.purge_for_owner(user_id).await?;
        self.store.delete_user(user_id).await?;

        info!(user_id, revoked_keys, deleted_bots, "User deleted");
        Ok(DeletionReport {
            user_id: user_id.to_string(),
            revoked_keys,
            deleted_bots,
        })
    }
}
