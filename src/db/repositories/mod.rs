pub mod api_key;
pub mod email_bot;
pub mod secret;
pub mod user;
