use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::{CryptoBox, KeySource, load_key_set};
use crate::db::Store;
use crate::mail::{MailTransport, Notifier, SmtpMailTransport};
use crate::services::{
    ApiKeyManager, EmailBotManager, KeyRotator, SeaOrmApiKeyManager, SeaOrmEmailBotManager,
    SeaOrmSecretStore, SeaOrmUserService, SecretStore, UserService,
};

/// Everything the HTTP layer and the CLI commands share.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub crypto: Arc<CryptoBox>,

    pub key_source: KeySource,

    pub secrets: Arc<dyn SecretStore>,

    pub api_keys: Arc<dyn ApiKeyManager>,

    pub email_bots: Arc<dyn EmailBotManager>,

    pub users: Arc<dyn UserService>,

    pub mail: Arc<dyn MailTransport>,

    pub notifier: Arc<Notifier>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_transport(config, Arc::new(SmtpMailTransport)).await
    }

    /// Builds the state around a caller supplied mail transport.
    pub async fn with_transport(
        config: Config,
        mail: Arc<dyn MailTransport>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let (keys, key_source) =
            load_key_set(&config.keyring).context("Failed to load master keys")?;
        let crypto = Arc::new(
            CryptoBox::new(keys, &config.security).context("Failed to initialize CryptoBox")?,
        );

        let secrets = Arc::new(SeaOrmSecretStore::new(store.clone())) as Arc<dyn SecretStore>;

        let api_keys = Arc::new(SeaOrmApiKeyManager::new(
            store.clone(),
            crypto.clone(),
            config.security.api_key_prefix.clone(),
        )) as Arc<dyn ApiKeyManager>;

        let email_bots = Arc::new(SeaOrmEmailBotManager::new(
            store.clone(),
            secrets.clone(),
            crypto.clone(),
        )) as Arc<dyn EmailBotManager>;

        let notifier = Arc::new(Notifier::new(mail.clone(), &config.mail));

        let users = Arc::new(SeaOrmUserService::new(
            store.clone(),
            api_keys.clone(),
            email_bots.clone(),
            notifier.clone(),
        )) as Arc<dyn UserService>;

        Ok(Self {
            config: Arc::new(config),
            store,
            crypto,
            key_source,
            secrets,
            api_keys,
            email_bots,
            users,
            mail,
            notifier,
        })
    }

    /// A rotator that persists keyring changes when the keys came from a file.
    #[must_use]
    pub fn key_rotator(&self) -> KeyRotator {
        KeyRotator::new(
            self.crypto.clone(),
            self.secrets.clone(),
            &self.config.rotation,
            self.key_source.writable_path().map(std::path::Path::to_path_buf),
        )
    }
}
