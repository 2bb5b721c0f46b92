use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use zeroize::Zeroizing;

use super::auth::CurrentUser;
use super::validation::validate_id;
use super::{
    ApiError, ApiResponse, AppState, CreateEmailBotRequest, CreatedBotResponse, MessageResponse,
    UpdateEmailBotRequest,
};
use crate::services::{EmailBotSummary, EmailBotUpdate, NewEmailBot};

/// GET /emailbot
pub async fn list_bots(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<EmailBotSummary>>>, ApiError> {
    let bots = state.shared.email_bots.list(&current.user.id).await?;
    Ok(Json(ApiResponse::success(bots)))
}

/// POST /emailbot
pub async fn create_bot(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateEmailBotRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedBotResponse>>), ApiError> {
    let bot = NewEmailBot {
        sender_email: request.sender_email,
        app_password: Zeroizing::new(request.app_password),
        display_name: request.display_name,
        smtp_server: request.smtp_server,
        smtp_port: request.smtp_port,
    };

    let bot_id = state.shared.email_bots.create(&current.user.id, bot).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreatedBotResponse { bot_id })),
    ))
}

/// PUT /emailbot/{bot_id}
pub async fn update_bot(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(bot_id): Path<String>,
    Json(request): Json<UpdateEmailBotRequest>,
) -> Result<Json<ApiResponse<EmailBotSummary>>, ApiError> {
    let bot_id = validate_id("bot", &bot_id)?;

    let update = EmailBotUpdate {
        sender_email: request.sender_email,
        app_password: request.app_password.map(Zeroizing::new),
        display_name: request.display_name,
        smtp_server: request.smtp_server,
        smtp_port: request.smtp_port,
    };
    if update.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }

    let summary = state
        .shared
        .email_bots
        .update(bot_id, &current.user.id, update)
        .await?;

    Ok(Json(ApiResponse::success(summary)))
}

/// DELETE /emailbot/{bot_id}
pub async fn delete_bot(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(bot_id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let bot_id = validate_id("bot", &bot_id)?;

    state
        .shared
        .email_bots
        .delete(bot_id, &current.user.id)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Email bot deleted",
    ))))
}
