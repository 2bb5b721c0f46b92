//! Domain service for accounts: registration, admin approval and cascade deletion.

use serde::Serialize;
use thiserror::Error;

use crate::models::{ApiKey, User, UserRole};
use crate::services::api_key_manager::{ApiKeyError, IssuedApiKey};
use crate::services::email_bot_manager::EmailBotError;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("A user with this email already exists")]
    AlreadyExists,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid user state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),

    #[error(transparent)]
    EmailBot(#[from] EmailBotError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for UserError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// A new account together with its one-time key plaintext.
#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub api_key: IssuedApiKey,
}

#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub user: User,
    pub api_key: Option<ApiKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub user_id: String,
    pub revoked_keys: u64,
    pub deleted_bots: u64,
}

#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Creates a pending user with a pending key and notifies admins.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::AlreadyExists`] if the email is taken.
    async fn register(&self, name: &str, email: &str) -> Result<Registration, UserError>;

    /// Operator path: creates a user with the given role, optionally approved on the spot.
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        role: UserRole,
        approved: bool,
    ) -> Result<Registration, UserError>;

    async fn get(&self, user_id: &str) -> Result<User, UserError>;

    async fn get_by_email(&self, email: &str) -> Result<User, UserError>;

    async fn list(&self) -> Result<Vec<User>, UserError>;

    async fn update(&self, user_id: &str, update: UserUpdate) -> Result<User, UserError>;

    /// `pending -> approved`, activating the pending key.
    async fn approve_user(&self, user_id: &str) -> Result<Approval, UserError>;

    /// `pending -> rejected`, rejecting the pending key.
    async fn reject_user(&self, user_id: &str) -> Result<User, UserError>;

    /// Revokes the live key and issues a replacement. Approved users get it active.
    async fn reissue_api_key(&self, user_id: &str) -> Result<IssuedApiKey, UserError>;

    /// Revokes keys, purges bots and their secrets, then removes the user.
    async fn delete_user(&self, user_id: &str) -> Result<DeletionReport, UserError>;
}
