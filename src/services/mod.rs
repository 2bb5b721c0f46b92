pub mod secret_store;
pub use secret_store::{SecretCursor, SecretStore, StoreError};

pub mod secret_store_impl;
pub use secret_store_impl::SeaOrmSecretStore;

pub mod api_key_manager;
pub use api_key_manager::{ApiKeyError, ApiKeyManager, IssuedApiKey, VerifiedApiKey};

pub mod api_key_manager_impl;
pub use api_key_manager_impl::SeaOrmApiKeyManager;

pub mod email_bot_manager;
pub use email_bot_manager::{
    EmailBotError, EmailBotManager, EmailBotSummary, EmailBotUpdate, NewEmailBot,
    SenderCredentials,
};

pub mod email_bot_manager_impl;
pub use email_bot_manager_impl::SeaOrmEmailBotManager;

pub mod user_service;
pub use user_service::{
    Approval, DeletionReport, Registration, UserError, UserService, UserUpdate,
};

pub mod user_service_impl;
pub use user_service_impl::SeaOrmUserService;

pub mod rotation;
pub use rotation::{KeyRotator, KeyStatus, RotationError, RotationSummary, SkippedRecord};

pub mod validation;
