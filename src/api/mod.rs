use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

mod admin;
pub mod auth;
mod emailbot;
mod error;
mod observability;
mod send;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/health", get(observability::health))
        .route("/register", post(users::register))
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api/v1", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route(
            "/admin/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/admin/users/{id}/approve", post(admin::approve_user))
        .route("/admin/users/{id}/reject", post(admin::reject_user))
        .route(
            "/admin/api-keys/{key_id}/approve",
            post(admin::approve_api_key),
        )
        .route(
            "/admin/api-keys/{key_id}/reject",
            post(admin::reject_api_key),
        )
        .route(
            "/admin/api-keys/{key_id}/revoke",
            post(admin::revoke_api_key),
        )
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn(auth::admin_middleware));

    Router::new()
        .route("/me", get(users::me))
        .route("/api-key/reissue", post(users::reissue_api_key))
        .route(
            "/emailbot",
            get(emailbot::list_bots).post(emailbot::create_bot),
        )
        .route(
            "/emailbot/{bot_id}",
            put(emailbot::update_bot).delete(emailbot::delete_bot),
        )
        .route("/send-email", post(send::send_email))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
