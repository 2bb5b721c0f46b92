use axum::{
    Extension, Json,
    extract::{Path, State},
};
use std::sync::Arc;
use tracing::info;

use super::auth::CurrentUser;
use super::validation::validate_id;
use super::{
    ApiError, ApiKeyDto, ApiResponse, AppState, ApprovalResponse, UpdateUserRequest, UserDto,
};
use crate::services::{DeletionReport, UserUpdate};

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    let users = state.shared.users.list().await?;
    Ok(Json(ApiResponse::success(
        users.into_iter().map(Into::into).collect(),
    )))
}

/// PUT /admin/users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user_id = validate_id("user", &user_id)?;

    if request.name.is_none() && request.email.is_none() && request.role.is_none() {
        return Err(ApiError::validation("No fields to update"));
    }

    let user = state
        .shared
        .users
        .update(
            user_id,
            UserUpdate {
                name: request.name,
                email: request.email,
                role: request.role,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(user.into())))
}

/// DELETE /admin/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<DeletionReport>>, ApiError> {
    let user_id = validate_id("user", &user_id)?;
    if user_id == current.user.id {
        return Err(ApiError::validation("Admins cannot delete their own account"));
    }

    let report = state.shared.users.delete_user(user_id).await?;
    info!(admin_id = %current.user.id, user_id, "Admin deleted user");
    Ok(Json(ApiResponse::success(report)))
}

/// POST /admin/users/{id}/approve
pub async fn approve_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<ApprovalResponse>>, ApiError> {
    let user_id = validate_id("user", &user_id)?;
    let approval = state.shared.users.approve_user(user_id).await?;

    Ok(Json(ApiResponse::success(ApprovalResponse {
        user: approval.user.into(),
        api_key: approval.api_key.map(Into::into),
    })))
}

/// POST /admin/users/{id}/reject
pub async fn reject_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user_id = validate_id("user", &user_id)?;
    let user = state.shared.users.reject_user(user_id).await?;
    Ok(Json(ApiResponse::success(user.into())))
}

/// POST /admin/api-keys/{key_id}/approve
pub async fn approve_api_key(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> Result<Json<ApiResponse<ApiKeyDto>>, ApiError> {
    let key_id = validate_id("API key", &key_id)?;
    let key = state.shared.api_keys.approve(key_id).await?;
    Ok(Json(ApiResponse::success(key.into())))
}

/// POST /admin/api-keys/{key_id}/reject
pub async fn reject_api_key(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> Result<Json<ApiResponse<ApiKeyDto>>, ApiError> {
    let key_id = validate_id("API key", &key_id)?;
    let key = state.shared.api_keys.reject(key_id).await?;
    Ok(Json(ApiResponse::success(key.into())))
}

/// POST /admin/api-keys/{key_id}/revoke
pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> Result<Json<ApiResponse<ApiKeyDto>>, ApiError> {
    let key_id = validate_id("API key", &key_id)?;
    let key = state.shared.api_keys.revoke(key_id).await?;
    Ok(Json(ApiResponse::success(key.into())))
}
