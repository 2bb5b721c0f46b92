use axum::{Extension, Json, extract::State};
use std::sync::Arc;
use tracing::info;

use super::auth::CurrentUser;
use super::validation::{validate_id, validate_recipients};
use super::{ApiError, ApiResponse, AppState, MessageResponse, SendEmailRequest};
use crate::mail::{OutgoingEmail, SenderIdentity};

/// POST /send-email
///
/// Sends as one of the caller's bots, or as the default Hermes sender when no
/// `bot_id` is given.
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<SendEmailRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    validate_recipients(&request.to, &request.cc, &request.bcc)?;
    if request.plain_text.is_none() && request.html_text.is_none() {
        return Err(ApiError::validation(
            "Either plain_text or html_text is required",
        ));
    }

    let mut sender = match request.bot_id.as_deref() {
        Some(bot_id) => {
            let bot_id = validate_id("bot", bot_id)?;
            // Ownership first, so another user's password is never decrypted.
            state
                .shared
                .email_bots
                .get(bot_id, &current.user.id)
                .await?;
            SenderIdentity::from(state.shared.email_bots.decrypt_for_send(bot_id).await?)
        }
        None => state
            .shared
            .config
            .mail
            .default_sender
            .as_ref()
            .map(SenderIdentity::from)
            .ok_or_else(|| {
                ApiError::validation("No bot_id given and no default sender is configured")
            })?,
    };

    if let Some(from_name) = request.from_name {
        sender.from_name = Some(from_name);
    }

    let email = OutgoingEmail {
        to: request.to,
        cc: request.cc,
        bcc: request.bcc,
        subject: request.subject,
        plain_text: request.plain_text,
        html_text: request.html_text,
        attachments: request.attachments,
    };

    state.shared.mail.send(&sender, &email).await?;

    info!(
        user_id = %current.user.id,
        bot_id = request.bot_id.as_deref().unwrap_or("default"),
        recipients = email.to.len() + email.cc.len() + email.bcc.len(),
        "Email dispatched"
    );

    Ok(Json(ApiResponse::success(MessageResponse::new("Email sent"))))
}
