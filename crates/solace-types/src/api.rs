use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Language, MoodEntry, MoodTrend, ResourceBundle, Role, User};

// -- JWT Claims --

/// Access-token claims, shared by the token issuer and the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: Option<u8>,
    pub gender: Option<String>,
    pub language: Option<Language>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

/// Partial profile update. Only the fields listed here can change; any other
/// key in the request body is rejected during deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub age: Option<u8>,
    pub gender: Option<String>,
    pub preferences: Option<PreferencesUpdate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreferencesUpdate {
    pub language: Option<Language>,
    pub notifications: Option<bool>,
}

// -- Chat --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatContext {
    /// Self-reported mood for this exchange (1-10).
    pub mood: Option<u8>,
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Stateless chat: the client carries its own prior turns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    pub context: Option<ChatContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyType {
    Text,
    Fallback,
    Crisis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    #[serde(rename = "type")]
    pub reply_type: ReplyType,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceBundle>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartResponse {
    pub session_id: String,
    pub conversation_id: String,
    pub message: ChatMessage,
    pub sessions_remaining: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub message: String,
    pub context: Option<ChatContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub conversation_id: String,
    pub message: ChatMessage,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceBundle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndSessionRequest {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub conversation_id: String,
    pub session_id: String,
    pub message_count: usize,
    pub duration_minutes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistoryResponse {
    pub conversation_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

// -- Progress --

/// `mood` is taken as a wide integer so out-of-range values reach validation
/// instead of failing deserialization.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoodRequest {
    pub mood: i64,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodResponse {
    pub entry: MoodEntry,
    pub average_mood: f64,
    pub total_entries: usize,
}

#[derive(Debug, Deserialize)]
pub struct MoodHistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodHistoryResponse {
    pub entries: Vec<MoodEntry>,
    pub average_mood: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOverview {
    pub total_sessions: u32,
    pub total_messages: u32,
    pub sessions_this_week: u32,
    pub weekly_session_limit: Option<u32>,
    pub sessions_remaining: Option<u32>,
    pub streak_days: u32,
    pub last_session_date: Option<DateTime<Utc>>,
    pub average_mood: Option<f64>,
    pub latest_mood: Option<u8>,
    pub mood_trend: MoodTrend,
    pub mood_entries: usize,
}

// -- Health --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub active_conversations: usize,
}
