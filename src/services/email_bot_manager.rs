//! Domain service for user-owned sender identities ("email bots").
//!
//! The sender address and the app password are stored as two separate
//! encrypted secrets owned by the bot id. The password only ever leaves this
//! service inside [`SenderCredentials`], for the send path.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::CryptoError;
use crate::services::secret_store::StoreError;

#[derive(Debug, Error)]
pub enum EmailBotError {
    #[error("Email bot not found")]
    NotFound,

    #[error("Email bot belongs to another user")]
    Forbidden,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Secret store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for EmailBotError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for EmailBotError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

pub struct NewEmailBot {
    pub sender_email: String,
    pub app_password: Zeroizing<String>,
    pub display_name: Option<String>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
}

/// Partial update. `None` leaves a field untouched; `display_name: Some(None)` clears it.
#[derive(Default)]
pub struct EmailBotUpdate {
    pub sender_email: Option<String>,
    pub app_password: Option<Zeroizing<String>>,
    pub display_name: Option<Option<String>>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
}

impl EmailBotUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sender_email.is_none()
            && self.app_password.is_none()
            && self.display_name.is_none()
            && self.smtp_server.is_none()
            && self.smtp_port.is_none()
    }
}

/// What the owner may see about a bot. Never includes the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailBotSummary {
    pub id: String,
    pub sender_email: String,
    pub display_name: Option<String>,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub created_at: String,
    pub updated_at: String,
}

/// Decrypted credentials handed to the mail transport.
pub struct SenderCredentials {
    pub bot_id: String,
    pub owner_id: String,
    pub sender_email: String,
    pub app_password: Zeroizing<String>,
    pub display_name: Option<String>,
    pub smtp_server: String,
    pub smtp_port: u16,
}

impl fmt::Debug for SenderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderCredentials")
            .field("bot_id", &self.bot_id)
            .field("owner_id", &self.owner_id)
            .field("sender_email", &self.sender_email)
            .field("app_password", &"<redacted>")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait EmailBotManager: Send + Sync {
    /// Encrypts and stores a new bot, returning its id.
    async fn create(&self, owner_id: &str, bot: NewEmailBot) -> Result<String, EmailBotError>;

    /// Re-encrypts only the fields that change.
    ///
    /// # Errors
    ///
    /// Returns [`EmailBotError::Forbidden`] if `owner_id` does not own the bot.
    async fn update(
        &self,
        bot_id: &str,
        owner_id: &str,
        update: EmailBotUpdate,
    ) -> Result<EmailBotSummary, EmailBotError>;

    /// Deletes the bot and purges both of its secrets.
    async fn delete(&self, bot_id: &str, owner_id: &str) -> Result<(), EmailBotError>;

    async fn get(&self, bot_id: &str, owner_id: &str) -> Result<EmailBotSummary, EmailBotError>;

    async fn list(&self, owner_id: &str) -> Result<Vec<EmailBotSummary>, EmailBotError>;

    /// Internal only: the send path. Ownership is checked by the caller via [`Self::get`].
    async fn decrypt_for_send(&self, bot_id: &str) -> Result<SenderCredentials, EmailBotError>;

    /// Deletes every bot of `owner_id` with its secrets. Returns the number of bots removed.
    async fn purge_for_owner(&self, owner_id: &str) -> Result<u64, EmailBotError>;
}
