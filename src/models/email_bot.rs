use serde::{Deserialize, Serialize};

pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Non-secret half of an email bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailBot {
    pub id: String,

    pub user_id: String,

    pub display_name: Option<String>,

    pub smtp_server: String,

    pub smtp_port: u16,

    pub created_at: String,

    pub updated_at: String,
}
