use serde::{Deserialize, Serialize};

use crate::mail::EmailAttachment;
use crate::models::{ApiKey, User, UserRole};
use crate::services::IssuedApiKey;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role.as_str().to_string(),
            status: user.status.as_str().to_string(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiKeyDto {
    pub id: String,
    pub user_id: String,
    pub key_prefix: String,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ApiKey> for ApiKeyDto {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            key_prefix: key.key_prefix,
            state: key.state.as_str().to_string(),
            created_at: key.created_at,
            updated_at: key.updated_at,
        }
    }
}

/// The only response that ever carries a plaintext key.
#[derive(Debug, Serialize)]
pub struct IssuedKeyDto {
    pub key: ApiKeyDto,
    pub api_key: String,
}

impl From<IssuedApiKey> for IssuedKeyDto {
    fn from(issued: IssuedApiKey) -> Self {
        Self {
            api_key: issued.plaintext.to_string(),
            key: issued.key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub user: UserDto,
    pub api_key: IssuedKeyDto,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserDto,
    pub api_key: Option<ApiKeyDto>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmailBotRequest {
    #[serde(alias = "email")]
    pub sender_email: String,
    #[serde(alias = "password")]
    pub app_password: String,
    #[serde(default, alias = "username")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmailBotRequest {
    #[serde(default, alias = "email")]
    pub sender_email: Option<String>,
    #[serde(default, alias = "password")]
    pub app_password: Option<String>,
    /// `null` clears the name, an absent field leaves it alone.
    #[serde(default, alias = "username", deserialize_with = "deserialize_some")]
    pub display_name: Option<Option<String>>,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct CreatedBotResponse {
    pub bot_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    /// Send as this bot; the default Hermes sender is used when absent.
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "email_plain_text")]
    pub plain_text: Option<String>,
    #[serde(default, alias = "email_html_text")]
    pub html_text: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub user: UserDto,
    pub api_key: Option<ApiKeyDto>,
}
