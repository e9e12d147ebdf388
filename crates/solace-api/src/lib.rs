//! HTTP surface: handlers, bearer auth and router assembly.

pub mod auth;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod progress;
pub mod tokens;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use solace_chat::Dispatcher;
use solace_db::{Database, UserRow};
use solace_types::api::HealthResponse;

use crate::error::ApiError;
use crate::tokens::TokenSettings;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub tokens: TokenSettings,
    pub started_at: DateTime<Utc>,
    /// Development mode: 500 responses include the internal cause.
    pub development: bool,
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/profile", patch(auth::update_profile).put(auth::update_profile))
        .route("/api/auth/account", delete(auth::delete_account))
        .route("/api/chat", post(chat::quick_chat))
        .route("/api/chat/session/start", post(chat::start_session))
        .route("/api/chat/message", post(chat::send_message))
        .route("/api/chat/session/end", post(chat::end_session))
        .route("/api/chat/session/{conversation_id}", get(chat::get_session))
        .route("/api/progress", post(progress::record_mood))
        .route("/api/progress/overview", get(progress::overview))
        .route("/api/progress/mood", get(progress::mood_history))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(
            state.development,
            middleware::render_internal_detail,
        ))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        active_conversations: state.dispatcher.conversations().len().await,
    })
}

/// Load the caller's account. Deactivated accounts read as missing.
pub(crate) fn load_active_user(state: &AppState, id: Uuid) -> Result<UserRow, ApiError> {
    state
        .db
        .get_user_by_id(id)?
        .filter(|row| row.is_active)
        .ok_or(ApiError::NotFound("User not found"))
}
