use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use tracing::info;

use solace_chat::ChatOutcome;
use solace_chat::usage::{ensure_session_quota, sessions_this_week};
use solace_types::api::{
    ChatRequest, ChatResponse, Claims, ConversationHistoryResponse, EndSessionRequest, ReplyType,
    SendMessageRequest, SendMessageResponse, SessionStartResponse, SessionSummary,
};

use crate::error::ApiError;
use crate::{AppState, load_active_user};

/// Stateless chat: the client sends its own recent turns.
pub async fn quick_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ChatRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    load_active_user(&state, claims.sub)?;
    let outcome = state
        .dispatcher
        .quick_chat(claims.sub, &req.message, &req.history, req.context.as_ref())
        .await?;

    let response = match outcome {
        ChatOutcome::Reply {
            message,
            suggestions,
            fallback,
        } => ChatResponse {
            reply: message.content,
            reply_type: if fallback { ReplyType::Fallback } else { ReplyType::Text },
            suggestions,
            resources: None,
            timestamp: message.timestamp,
        },
        ChatOutcome::Crisis {
            message, resources, ..
        } => ChatResponse {
            reply: message.content,
            reply_type: ReplyType::Crisis,
            suggestions: Vec::new(),
            resources: Some(resources),
            timestamp: message.timestamp,
        },
    };

    Ok(Json(response))
}

/// Open a conversation, subject to the weekly quota of the caller's plan.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_active_user(&state, claims.sub)?;
    let user = row.to_user();

    let used = sessions_this_week(
        user.stats.sessions_this_week,
        user.stats.last_session_date,
        Utc::now(),
    );
    let remaining = ensure_session_quota(user.subscription.tier, used).inspect_err(|e| {
        info!(user_id = %claims.sub, "Session start refused: {}", e);
    })?;

    let started = state
        .dispatcher
        .start_session(claims.sub, user.preferences.language)
        .await?;

    Ok(Json(SessionStartResponse {
        session_id: started.session_id,
        conversation_id: started.conversation_id,
        message: started.welcome,
        sessions_remaining: remaining,
    }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    load_active_user(&state, claims.sub)?;
    let outcome = state
        .dispatcher
        .send_message(
            claims.sub,
            &req.conversation_id,
            &req.message,
            req.context.as_ref(),
        )
        .await?;

    let response = match outcome {
        ChatOutcome::Reply {
            message,
            suggestions,
            ..
        } => SendMessageResponse {
            conversation_id: req.conversation_id,
            message,
            suggestions,
            resources: None,
        },
        ChatOutcome::Crisis {
            message, resources, ..
        } => SendMessageResponse {
            conversation_id: req.conversation_id,
            message,
            suggestions: Vec::new(),
            resources: Some(resources),
        },
    };

    Ok(Json(response))
}

pub async fn end_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<EndSessionRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    load_active_user(&state, claims.sub)?;
    let ended = state
        .dispatcher
        .end_session(claims.sub, &req.conversation_id)
        .await?;

    Ok(Json(SessionSummary {
        conversation_id: ended.conversation_id,
        session_id: ended.session_id,
        message_count: ended.message_count,
        duration_minutes: ended.duration_minutes,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    load_active_user(&state, claims.sub)?;
    let session = state
        .dispatcher
        .history(claims.sub, &conversation_id)
        .await?;

    Ok(Json(ConversationHistoryResponse {
        conversation_id: session.conversation_id,
        session_id: session.session_id,
        started_at: session.context.started_at,
        messages: session.messages,
    }))
}
