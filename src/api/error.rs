use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::mail::MailError;
use crate::services::{ApiKeyError, EmailBotError, StoreError, UserError};

/// Shown for every failed authentication, whatever the cause.
pub const UNAUTHORIZED_MESSAGE: &str = "invalid or revoked key";

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ExternalApiError { service: String, message: String },

    ValidationError(String),

    Conflict(String),

    InternalError(String),

    Unauthorized,

    Forbidden(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::ExternalApiError { service, message } => {
                write!(f, "{service} error: {message}")
            }
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized => write!(f, "Unauthorized: {UNAUTHORIZED_MESSAGE}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            Self::ExternalApiError { service, message } => {
                tracing::warn!("{} error: {}", service, message);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("{service} delivery failed"),
                )
            }
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE.to_string()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(format!("{err:#}"))
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        match err {
            ApiKeyError::InvalidKey => Self::Unauthorized,
            ApiKeyError::NotFound => Self::NotFound(err.to_string()),
            ApiKeyError::AlreadyPending | ApiKeyError::InvalidStateTransition { .. } => {
                Self::Conflict(err.to_string())
            }
            ApiKeyError::Database(msg) => Self::DatabaseError(msg),
            ApiKeyError::Crypto(_) | ApiKeyError::Internal(_) => {
                Self::InternalError(err.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound(err.to_string()),
            StoreError::Conflict => Self::Conflict(err.to_string()),
            StoreError::Database(msg) => Self::DatabaseError(msg),
            StoreError::KeyMismatch { .. } => Self::InternalError(err.to_string()),
        }
    }
}

impl From<EmailBotError> for ApiError {
    fn from(err: EmailBotError) -> Self {
        match err {
            EmailBotError::NotFound => Self::NotFound(err.to_string()),
            EmailBotError::Forbidden => Self::Forbidden(err.to_string()),
            EmailBotError::Validation(msg) => Self::ValidationError(msg),
            EmailBotError::Store(e) => e.into(),
            EmailBotError::Database(msg) => Self::DatabaseError(msg),
            EmailBotError::Crypto(_) => Self::InternalError(err.to_string()),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => Self::NotFound(err.to_string()),
            UserError::AlreadyExists | UserError::InvalidState(_) => {
                Self::Conflict(err.to_string())
            }
            UserError::Validation(msg) => Self::ValidationError(msg),
            UserError::ApiKey(e) => e.into(),
            UserError::EmailBot(e) => e.into(),
            UserError::Database(msg) => Self::DatabaseError(msg),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::InvalidAddress { .. } | MailError::InvalidMessage(_) => {
                Self::ValidationError(err.to_string())
            }
            MailError::Delivery(message) => Self::ExternalApiError {
                service: "SMTP".to_string(),
                message,
            },
        }
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{resource} {id} not found"))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
