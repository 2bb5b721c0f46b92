use anyhow::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr, Statement,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::crypto::{EncryptedSecretRecord, SecretKind};
use crate::models::{ApiKey, ApiKeyState, EmailBot, User, UserRole, UserStatus};

pub mod migrator;
pub mod repositories;

/// Result of a write that can collide with a uniqueness rule or a missing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    NotFound,
    Duplicate,
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite:")
                .trim_start_matches("//")
                .split('?')
                .next()
                .unwrap_or_default();
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn api_key_repo(&self) -> repositories::api_key::ApiKeyRepository {
        repositories::api_key::ApiKeyRepository::new(self.conn.clone())
    }

    fn email_bot_repo(&self) -> repositories::email_bot::EmailBotRepository {
        repositories::email_bot::EmailBotRepository::new(self.conn.clone())
    }

    fn secret_repo(&self) -> repositories::secret::SecretRepository {
        repositories::secret::SecretRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn create_user(&self, user: &User) -> Result<WriteOutcome> {
        self.user_repo().create(user).await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.user_repo().get(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn list_users_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        self.user_repo().list_by_role(role).await
    }

    pub async fn transition_user_status(
        &self,
        id: &str,
        from: &[UserStatus],
        to: UserStatus,
    ) -> Result<bool> {
        self.user_repo().transition_status(id, from, to).await
    }

    pub async fn update_user(
        &self,
        id: &str,
        name: Option<&str>,
        email: Option<&str>,
        role: Option<UserRole>,
    ) -> Result<WriteOutcome> {
        self.user_repo().update_profile(id, name, email, role).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    // ========================================================================
    // API keys
    // ========================================================================

    pub async fn insert_api_key(&self, key: &ApiKey) -> Result<WriteOutcome> {
        self.api_key_repo().insert(key).await
    }

    pub async fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>> {
        self.api_key_repo().get(id).await
    }

    pub async fn live_api_key_for_user(&self, user_id: &str) -> Result<Option<ApiKey>> {
        self.api_key_repo().live_for_user(user_id).await
    }

    pub async fn list_api_keys_for_user(&self, user_id: &str) -> Result<Vec<ApiKey>> {
        self.api_key_repo().list_for_user(user_id).await
    }

    pub async fn active_api_keys_by_prefix(&self, key_prefix: &str) -> Result<Vec<ApiKey>> {
        self.api_key_repo().active_by_prefix(key_prefix).await
    }

    pub async fn transition_api_key(
        &self,
        id: &str,
        from: &[ApiKeyState],
        to: ApiKeyState,
    ) -> Result<bool> {
        self.api_key_repo().transition(id, from, to).await
    }

    pub async fn transition_api_keys_for_user(
        &self,
        user_id: &str,
        from: &[ApiKeyState],
        to: ApiKeyState,
    ) -> Result<u64> {
        self.api_key_repo()
            .transition_for_user(user_id, from, to)
            .await
    }

    // ========================================================================
    // Email bots
    // ========================================================================

    pub async fn insert_email_bot(&self, bot: &EmailBot) -> Result<()> {
        self.email_bot_repo().insert(bot).await
    }

    pub async fn get_email_bot(&self, id: &str) -> Result<Option<EmailBot>> {
        self.email_bot_repo().get(id).await
    }

    pub async fn list_email_bots(&self, user_id: &str) -> Result<Vec<EmailBot>> {
        self.email_bot_repo().list_for_user(user_id).await
    }

    pub async fn email_bot_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        self.email_bot_repo().ids_for_user(user_id).await
    }

    pub async fn update_email_bot(&self, bot: &EmailBot) -> Result<bool> {
        self.email_bot_repo().update_metadata(bot).await
    }

    pub async fn delete_email_bot(&self, id: &str) -> Result<bool> {
        self.email_bot_repo().delete(id).await
    }

    // ========================================================================
    // Encrypted secrets
    // ========================================================================

    pub async fn upsert_secret(&self, record: &EncryptedSecretRecord) -> Result<()> {
        self.secret_repo().upsert(record).await
    }

    pub async fn get_secret(
        &self,
        owner_id: &str,
        kind: SecretKind,
    ) -> Result<Option<EncryptedSecretRecord>> {
        self.secret_repo().get(owner_id, kind).await
    }

    pub async fn list_secrets_by_key_version(
        &self,
        version: u32,
        after: Option<(&str, SecretKind)>,
        limit: u64,
    ) -> Result<Vec<EncryptedSecretRecord>> {
        self.secret_repo()
            .list_by_key_version(version, after, limit)
            .await
    }

    pub async fn count_secrets_by_key_version(&self, version: u32) -> Result<u64> {
        self.secret_repo().count_by_key_version(version).await
    }

    pub async fn secret_version_histogram(&self) -> Result<Vec<(u32, u64)>> {
        self.secret_repo().version_histogram().await
    }

    pub async fn compare_and_swap_secret(
        &self,
        expected_version: u32,
        expected_nonce: Option<&[u8]>,
        new: &EncryptedSecretRecord,
    ) -> Result<bool> {
        self.secret_repo()
            .compare_and_swap(expected_version, expected_nonce, new)
            .await
    }

    pub async fn delete_secret(&self, owner_id: &str, kind: SecretKind) -> Result<bool> {
        self.secret_repo().delete(owner_id, kind).await
    }

    pub async fn delete_secrets_for_owner(&self, owner_id: &str) -> Result<u64> {
        self.secret_repo().delete_owner(owner_id).await
    }
}
