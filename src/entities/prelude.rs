pub use super::api_keys::Entity as ApiKeys;
pub use super::email_bots::Entity as EmailBots;
pub use super::encrypted_secrets::Entity as EncryptedSecrets;
pub use super::users::Entity as Users;
