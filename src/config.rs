use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const BOT_EMAIL_ENV: &str = "HERMES_BOT_EMAIL";
pub const BOT_PASSWORD_ENV: &str = "HERMES_BOT_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub keyring: KeyringConfig,

    pub rotation: RotationConfig,

    pub mail: MailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/hermes.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8025,
            cors_allowed_origins: vec![
                "http://localhost:8025".to_string(),
                "http://127.0.0.1:8025".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Leading tag of every issued API key, e.g. `hrm_1a2b3c4d_...`.
    pub api_key_prefix: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            api_key_prefix: "hrm".to_string(),
        }
    }
}

/// Where the master key generations live.
///
/// The environment variable wins when set; it uses the `1:<base64>,2:<base64>` form.
/// Rotation needs the file, since an environment variable cannot be rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    pub path: String,

    pub env_var: String,

    pub create_if_missing: bool,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            path: "data/keyring.toml".to_string(),
            env_var: "HERMES_MASTER_KEYS".to_string(),
            create_if_missing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Records re-encrypted per store round trip.
    pub batch_size: u64,

    /// Re-read attempts when a record changes under the rotator.
    pub max_conflict_retries: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_conflict_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Sender used for `/send-email` without a bot and for admin notifications.
    pub default_sender: Option<DefaultSenderConfig>,

    pub notify_admins_on_registration: bool,

    pub notify_user_on_approval: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            default_sender: None,
            notify_admins_on_registration: true,
            notify_user_on_approval: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSenderConfig {
    pub email: String,

    #[serde(skip_serializing)]
    pub password: String,

    pub from_name: Option<String>,

    pub smtp_server: String,

    pub smtp_port: u16,
}

impl Default for DefaultSenderConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            from_name: Some("Hermes".to_string()),
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
        }
    }
}

impl std::fmt::Debug for DefaultSenderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultSenderConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            json_logs: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Fills the default sender from `HERMES_BOT_EMAIL` / `HERMES_BOT_PASSWORD`.
    pub fn apply_env_overrides(&mut self) {
        let email = std::env::var(BOT_EMAIL_ENV).ok().filter(|v| !v.is_empty());
        let password = std::env::var(BOT_PASSWORD_ENV)
            .ok()
            .filter(|v| !v.is_empty());

        if email.is_none() && password.is_none() {
            return;
        }

        let sender = self
            .mail
            .default_sender
            .get_or_insert_with(DefaultSenderConfig::default);
        if let Some(email) = email {
            sender.email = email;
        }
        if let Some(password) = password {
            sender.password = password;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("hermes").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".hermes").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing(path: &Path) -> Result<bool> {
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.database_path.trim().is_empty() {
            anyhow::bail!("general.database_path cannot be empty");
        }

        if self.general.min_db_connections > self.general.max_db_connections {
            anyhow::bail!("general.min_db_connections cannot exceed max_db_connections");
        }

        if self.server.port == 0 {
            anyhow::bail!("server.port must be > 0");
        }

        if self.security.argon2_memory_cost_kib < 8 * self.security.argon2_parallelism.max(1) {
            anyhow::bail!("security.argon2_memory_cost_kib must be at least 8 * parallelism");
        }

        if self.security.argon2_time_cost == 0 || self.security.argon2_parallelism == 0 {
            anyhow::bail!("security.argon2_time_cost and argon2_parallelism must be > 0");
        }

        let prefix = &self.security.api_key_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!("security.api_key_prefix must be non-empty and alphanumeric");
        }

        if self.rotation.batch_size == 0 {
            anyhow::bail!("rotation.batch_size must be > 0");
        }

        if let Some(sender) = &self.mail.default_sender
            && (sender.email.is_empty() || sender.smtp_server.is_empty())
        {
            anyhow::bail!("mail.default_sender needs an email and an smtp_server");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.database_path, "sqlite:data/hermes.db");
        assert_eq!(config.security.api_key_prefix, "hrm");
        assert_eq!(config.rotation.batch_size, 100);
        assert!(config.mail.default_sender.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[keyring]"));
        assert!(toml_str.contains("[rotation]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [rotation]
            batch_size = 10

            [mail.default_sender]
            email = "bot@example.com"
            password = "app-password"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.rotation.batch_size, 10);
        assert_eq!(config.rotation.max_conflict_retries, 5);

        let sender = config.mail.default_sender.unwrap();
        assert_eq!(sender.smtp_server, "smtp.gmail.com");
        assert_eq!(sender.smtp_port, 587);
    }

    #[test]
    fn test_sender_password_is_never_written_or_printed() {
        let mut config = Config::default();
        config.mail.default_sender = Some(DefaultSenderConfig {
            email: "bot@example.com".to_string(),
            password: "super-secret".to_string(),
            ..DefaultSenderConfig::default()
        });

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("super-secret"));
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.rotation.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.security.api_key_prefix = "hr-m".to_string();
        assert!(config.validate().is_err());
    }
}
