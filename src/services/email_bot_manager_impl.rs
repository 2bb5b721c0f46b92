//! `SeaORM` implementation of the `EmailBotManager` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{CryptoBox, SecretKind};
use crate::db::Store;
use crate::models::EmailBot;
use crate::models::email_bot::{DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER};
use crate::services::email_bot_manager::{
    EmailBotError, EmailBotManager, EmailBotSummary, EmailBotUpdate, NewEmailBot,
    SenderCredentials,
};
use crate::services::secret_store::{SecretStore, StoreError};
use crate::services::validation;

pub struct SeaOrmEmailBotManager {
    store: Store,
    secrets: Arc<dyn SecretStore>,
    crypto: Arc<CryptoBox>,
}

impl SeaOrmEmailBotManager {
    #[must_use]
    pub fn new(store: Store, secrets: Arc<dyn SecretStore>, crypto: Arc<CryptoBox>) -> Self {
        Self {
            store,
            secrets,
            crypto,
        }
    }

    async fn owned_bot(&self, bot_id: &str, owner_id: &str) -> Result<EmailBot, EmailBotError> {
        let bot = self
            .store
            .get_email_bot(bot_id)
            .await?
            .ok_or(EmailBotError::NotFound)?;

        if bot.user_id != owner_id {
            warn!(bot_id, owner_id, "Email bot ownership check failed");
            return Err(EmailBotError::Forbidden);
        }
        Ok(bot)
    }

    async fn store_secret(
        &self,
        bot_id: &str,
        kind: SecretKind,
        plaintext: &str,
    ) -> Result<(), EmailBotError> {
        let record = self.crypto.encrypt(bot_id, kind, plaintext.as_bytes())?;
        self.secrets.put(&record).await?;
        Ok(())
    }

    async fn read_secret(
        &self,
        bot_id: &str,
        kind: SecretKind,
    ) -> Result<Zeroizing<String>, EmailBotError> {
        let record = self.secrets.get(bot_id, kind).await.map_err(|e| match e {
            StoreError::NotFound => EmailBotError::NotFound,
            other => other.into(),
        })?;
        Ok(self.crypto.decrypt_string(&record)?)
    }

    async fn summarize(&self, bot: EmailBot) -> Result<EmailBotSummary, EmailBotError> {
        let sender_email = self.read_secret(&bot.id, SecretKind::BotEmail).await?;
        Ok(EmailBotSummary {
            id: bot.id,
            sender_email: sender_email.to_string(),
            display_name: bot.display_name,
            smtp_server: bot.smtp_server,
            smtp_port: bot.smtp_port,
            created_at: bot.created_at,
            updated_at: bot.updated_at,
        })
    }

    fn validate_port(port: u16) -> Result<u16, EmailBotError> {
        if port == 0 {
            return Err(EmailBotError::Validation("SMTP port must be > 0".to_string()));
        }
        Ok(port)
    }

    fn validate_password(password: &str) -> Result<(), EmailBotError> {
        if password.trim().is_empty() {
            return Err(EmailBotError::Validation(
                "App password cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn clean_display_name(name: Option<String>) -> Option<String> {
        name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
    }
}

#[async_trait]
impl EmailBotManager for SeaOrmEmailBotManager {
    async fn create(&self, owner_id: &str, bot: NewEmailBot) -> Result<String, EmailBotError> {
        let sender_email =
            validation::normalize_email(&bot.sender_email).map_err(EmailBotError::Validation)?;
        Self::validate_password(&bot.app_password)?;
        let smtp_server = match bot.smtp_server.as_deref() {
            Some(server) => validation::validate_smtp_server(server)
                .map_err(EmailBotError::Validation)?,
            None => DEFAULT_SMTP_SERVER.to_string(),
        };
        let smtp_port = Self::validate_port(bot.smtp_port.unwrap_or(DEFAULT_SMTP_PORT))?;

        let now = chrono::Utc::now().to_rfc3339();
        let row = EmailBot {
            id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_string(),
            display_name: Self::clean_display_name(bot.display_name),
            smtp_server,
            smtp_port,
            created_at: now.clone(),
            updated_at: now,
        };

        self.store.insert_email_bot(&row).await?;

        let stored = async {
            self.store_secret(&row.id, SecretKind::BotEmail, &sender_email)
                .await?;
            self.store_secret(&row.id, SecretKind::BotPassword, &bot.app_password)
                .await
        }
        .await;

        if let Err(e) = stored {
            // Do not leave a bot behind without both halves of its credentials.
            if let Err(cleanup) = self.secrets.delete_owner(&row.id).await {
                warn!(bot_id = %row.id, error = %cleanup, "Failed to remove secrets of half-created bot");
            }
            if let Err(cleanup) = self.store.delete_email_bot(&row.id).await {
                warn!(bot_id = %row.id, error = %cleanup, "Failed to remove half-created bot");
            }
            return Err(e);
        }

        info!(bot_id = %row.id, owner_id, "Created email bot");
        Ok(row.id)
    }

    async fn update(
        &self,
        bot_id: &str,
        owner_id: &str,
        update: EmailBotUpdate,
    ) -> Result<EmailBotSummary, EmailBotError> {
        let mut bot = self.owned_bot(bot_id, owner_id).await?;

        if update.is_empty() {
            return self.summarize(bot).await;
        }

        // Everything is checked and encrypted before the first write.
        let sender_email = update
            .sender_email
            .as_deref()
            .map(validation::normalize_email)
            .transpose()
            .map_err(EmailBotError::Validation)?;
        if let Some(password) = update.app_password.as_deref() {
            Self::validate_password(password)?;
        }
        let smtp_server = update
            .smtp_server
            .as_deref()
            .map(validation::validate_smtp_server)
            .transpose()
            .map_err(EmailBotError::Validation)?;
        let smtp_port = update.smtp_port.map(Self::validate_port).transpose()?;

        let mut records = Vec::with_capacity(2);
        if let Some(email) = &sender_email {
            records.push(
                self.crypto
                    .encrypt(bot_id, SecretKind::BotEmail, email.as_bytes())?,
            );
        }
        if let Some(password) = update.app_password.as_deref() {
            records.push(
                self.crypto
                    .encrypt(bot_id, SecretKind::BotPassword, password.as_bytes())?,
            );
        }
        for record in &records {
            self.secrets.put(record).await?;
        }

        let mut metadata_changed = false;
        if let Some(display_name) = update.display_name {
            bot.display_name = Self::clean_display_name(display_name);
            metadata_changed = true;
        }
        if let Some(server) = smtp_server {
            bot.smtp_server = server;
            metadata_changed = true;
        }
        if let Some(port) = smtp_port {
            bot.smtp_port = port;
            metadata_changed = true;
        }

        if metadata_changed && !self.store.update_email_bot(&bot).await? {
            return Err(EmailBotError::NotFound);
        }

        info!(bot_id, owner_id, "Updated email bot");
        let bot = self
            .store
            .get_email_bot(bot_id)
            .await?
            .ok_or(EmailBotError::NotFound)?;
        self.summarize(bot).await
    }

    async fn delete(&self, bot_id: &str, owner_id: &str) -> Result<(), EmailBotError> {
        self.owned_bot(bot_id, owner_id).await?;

        let purged = self.secrets.delete_owner(bot_id).await?;
        self.store.delete_email_bot(bot_id).await?;

        info!(bot_id, owner_id, purged, "Deleted email bot");
        Ok(())
    }

    async fn get(&self, bot_id: &str, owner_id: &str) -> Result<EmailBotSummary, EmailBotError> {
        let bot = self.owned_bot(bot_id, owner_id).await?;
        self.summarize(bot).await
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<EmailBotSummary>, EmailBotError> {
        let bots = self.store.list_email_bots(owner_id).await?;

        let mut summaries = Vec::with_capacity(bots.len());
        for bot in bots {
            let bot_id = bot.id.clone();
            match self.summarize(bot).await {
                Ok(summary) => summaries.push(summary),
                // Mid-create or half-deleted; the rest of the listing still stands.
                Err(EmailBotError::NotFound) => {
                    warn!(bot_id = %bot_id, owner_id, "Email bot has no stored address, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    async fn decrypt_for_send(&self, bot_id: &str) -> Result<SenderCredentials, EmailBotError> {
        let bot = self
            .store
            .get_email_bot(bot_id)
            .await?
            .ok_or(EmailBotError::NotFound)?;

        let sender_email = self.read_secret(bot_id, SecretKind::BotEmail).await?;
        let app_password = self.read_secret(bot_id, SecretKind::BotPassword).await?;

        Ok(SenderCredentials {
            bot_id: bot.id,
            owner_id: bot.user_id,
            sender_email: sender_email.to_string(),
            app_password,
            display_name: bot.display_name,
            smtp_server: bot.smtp_server,
            smtp_port: bot.smtp_port,
        })
    }

    async fn purge_for_owner(&self, owner_id: &str) -> Result<u64, EmailBotError> {
        let bot_ids = self.store.email_bot_ids_for_user(owner_id).await?;

        let mut removed = 0;
        for bot_id in &bot_ids {
            self.secrets.delete_owner(bot_id).await?;
            if self.store.delete_email_bot(bot_id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(owner_id, removed, "Purged email bots for owner");
        }
        Ok(removed)
    }
}
