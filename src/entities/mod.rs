pub mod prelude;

pub mod api_keys;
pub mod email_bots;
pub mod encrypted_secrets;
pub mod users;
