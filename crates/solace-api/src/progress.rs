use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{SubsecRound, Utc};
use tracing::debug;

use solace_chat::usage::{mood_trend, sessions_this_week};
use solace_db::models::round_tenth;
use solace_db::queries::MOOD_HISTORY_LIMIT;
use solace_types::api::{
    Claims, MoodHistoryQuery, MoodHistoryResponse, MoodRequest, MoodResponse, ProgressOverview,
};
use solace_types::models::MoodEntry;

use crate::error::{ApiError, FieldError};
use crate::{AppState, load_active_user};

const MAX_NOTE_CHARS: usize = 500;
const DEFAULT_HISTORY_LIMIT: usize = 30;

/// Record a mood sample and return the running average.
pub async fn record_mood(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<MoodRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let note = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let mut errors = Vec::new();
    let mood = u8::try_from(req.mood).ok().filter(|m| (1..=10).contains(m));
    if mood.is_none() {
        errors.push(FieldError::new("mood", "Mood must be an integer between 1 and 10"));
    }
    if note.is_some_and(|n| n.chars().count() > MAX_NOTE_CHARS) {
        errors.push(FieldError::new(
            "note",
            format!("Note cannot exceed {} characters", MAX_NOTE_CHARS),
        ));
    }
    let Some(mood) = mood.filter(|_| errors.is_empty()) else {
        return Err(ApiError::Validation {
            message: "Validation failed".into(),
            details: errors,
        });
    };

    load_active_user(&state, claims.sub)?;

    // Stored timestamps have second precision.
    let recorded_at = Utc::now().trunc_subsecs(0);
    let summary = state.db.insert_mood(claims.sub, mood, note, recorded_at)?;
    debug!(user_id = %claims.sub, mood, entries = summary.count, "Mood recorded");

    Ok(Json(MoodResponse {
        entry: MoodEntry {
            mood,
            note: note.map(str::to_string),
            recorded_at,
        },
        average_mood: round_tenth(summary.average),
        total_entries: summary.count,
    }))
}

pub async fn overview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = load_active_user(&state, claims.sub)?.to_user();
    let moods: Vec<u8> = state
        .db
        .get_mood_entries(claims.sub, MOOD_HISTORY_LIMIT)?
        .iter()
        .map(|row| row.to_entry().mood)
        .collect();

    let stats = user.stats;
    let limit = user.subscription.weekly_session_limit;
    let used = sessions_this_week(stats.sessions_this_week, stats.last_session_date, Utc::now());

    Ok(Json(ProgressOverview {
        total_sessions: stats.total_sessions,
        total_messages: stats.total_messages,
        sessions_this_week: used,
        weekly_session_limit: limit,
        sessions_remaining: limit.map(|l| l.saturating_sub(used)),
        streak_days: stats.streak_days,
        last_session_date: stats.last_session_date,
        average_mood: stats.average_mood,
        latest_mood: moods.last().copied(),
        mood_trend: mood_trend(&moods),
        mood_entries: moods.len(),
    }))
}

/// Recent mood entries, oldest first.
pub async fn mood_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<MoodHistoryQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .map_or(DEFAULT_HISTORY_LIMIT, |l| l as usize)
        .clamp(1, MOOD_HISTORY_LIMIT);

    let user = load_active_user(&state, claims.sub)?.to_user();
    let entries = state
        .db
        .get_mood_entries(claims.sub, limit)?
        .iter()
        .map(|row| row.to_entry())
        .collect();

    Ok(Json(MoodHistoryResponse {
        entries,
        average_mood: user.stats.average_mood,
    }))
}
