#![allow(dead_code)]

use async_trait::async_trait;
use hermes::config::{Config, DefaultSenderConfig};
use hermes::mail::{MailError, MailTransport, OutgoingEmail, SenderIdentity};
use hermes::models::UserRole;
use hermes::state::SharedState;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Remembers every message instead of talking to an SMTP server.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, OutgoingEmail)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, OutgoingEmail)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, from: &SenderIdentity, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((from.email.clone(), email.clone()));
        Ok(())
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub state: Arc<SharedState>,
    pub mail: Arc<RecordingTransport>,
}

/// Cheap Argon2, a throwaway database and keyring, and a default sender.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}?mode=rwc", dir.join("hermes.db").display());
    config.keyring.path = dir.join("keyring.toml").display().to_string();
    config.keyring.env_var = "HERMES_TEST_KEYS_NOT_SET".to_string();
    config.security.argon2_memory_cost_kib = 8;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;
    config.rotation.batch_size = 2;
    config.observability.metrics_enabled = false;
    config.mail.default_sender = Some(DefaultSenderConfig {
        email: "hermes@example.com".to_string(),
        password: "hermes-app-password".to_string(),
        ..DefaultSenderConfig::default()
    });
    config
}

pub async fn spawn_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    spawn_env_with(dir, config).await
}

pub async fn spawn_env_with(dir: TempDir, config: Config) -> TestEnv {
    let mail = Arc::new(RecordingTransport::default());
    let state = SharedState::with_transport(config, mail.clone())
        .await
        .expect("Failed to create shared state");

    TestEnv {
        dir,
        state: Arc::new(state),
        mail,
    }
}

/// An approved user with an active key. Returns `(user_id, plaintext_key)`.
pub async fn approved_user(state: &SharedState, name: &str, email: &str, role: UserRole) -> (String, String) {
    let registration = state
        .users
        .create_user(name, email, role, true)
        .await
        .unwrap();
    (
        registration.user.id,
        registration.api_key.plaintext.to_string(),
    )
}
