use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::models::User;

/// The authenticated caller, placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub key_id: String,
}

/// Resolves `Authorization: Bearer <key>` to an approved user.
///
/// Every failure, including a key whose owner has since been deleted, is the
/// same 401 so callers cannot probe which keys exist.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = extract_bearer(&headers).ok_or(ApiError::Unauthorized)?;

    let verified = state.shared.api_keys.verify(key).await?;

    let user = state
        .shared
        .store
        .get_user(&verified.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    tracing::Span::current().record("user_id", user.id.as_str());
    request.extensions_mut().insert(CurrentUser {
        user,
        key_id: verified.key_id,
    });

    Ok(next.run(request).await)
}

/// Must run inside [`auth_middleware`].
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|current| current.user.is_admin());

    if !is_admin {
        return Err(ApiError::forbidden("Admin access required"));
    }

    Ok(next.run(request).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_static("Bearer hrm_0011aabb_ff"),
        );
        assert_eq!(extract_bearer(&headers), Some("hrm_0011aabb_ff"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);
    }
}
