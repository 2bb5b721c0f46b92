pub mod api_key;
pub mod email_bot;
pub mod user;

pub use api_key::{ApiKey, ApiKeyState};
pub use email_bot::EmailBot;
pub use user::{User, UserRole, UserStatus};

/// Error for a stored enum column holding an unknown value.
#[derive(Debug, thiserror::Error)]
#[error("unknown {field} value '{value}'")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}
