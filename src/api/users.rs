use axum::{Extension, Json, extract::State, http::StatusCode};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{
    ApiError, ApiResponse, AppState, IssuedKeyDto, MeResponse, RegisterRequest,
    RegistrationResponse,
};

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegistrationResponse>>), ApiError> {
    let registration = state
        .shared
        .users
        .register(&request.name, &request.email)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RegistrationResponse {
            user: registration.user.into(),
            api_key: registration.api_key.into(),
            message: "Registered. The key works once an admin approves the account; \
                      it is shown only this once."
                .to_string(),
        })),
    ))
}

/// GET /me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let api_key = state
        .shared
        .api_keys
        .live_key_for_user(&current.user.id)
        .await?;

    Ok(Json(ApiResponse::success(MeResponse {
        user: current.user.into(),
        api_key: api_key.map(Into::into),
    })))
}

/// POST /api-key/reissue
///
/// Revokes the key used for this request.
pub async fn reissue_api_key(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<IssuedKeyDto>>, ApiError> {
    let issued = state
        .shared
        .users
        .reissue_api_key(&current.user.id)
        .await?;

    Ok(Json(ApiResponse::success(issued.into())))
}
