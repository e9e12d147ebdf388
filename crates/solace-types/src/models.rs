use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Subscription --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Premium,
}

impl SubscriptionTier {
    /// Weekly chat-session allowance. `None` means unlimited.
    pub fn weekly_session_quota(self) -> Option<u32> {
        match self {
            Self::Free => Some(5),
            Self::Basic => Some(20),
            Self::Premium => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown subscription tier '{}'", other)),
        }
    }
}

// -- Language --

/// Languages the scripted content (welcome, fallback, crisis resources) ships in.
/// Any tag deserializes; unknown ones resolve to the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    /// Resolve a language tag such as `en`, `en-US` or `ES`.
    /// Unknown tags fall back to the default language.
    pub fn from_tag(tag: &str) -> Self {
        let primary = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Self::En,
            _ => Self::Es,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::En => "en",
        }
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Users --

/// Public representation of an account. The password hash and the
/// lockout bookkeeping never leave the database layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: Option<u8>,
    pub gender: Option<String>,
    pub subscription: Subscription,
    pub stats: UserStats,
    pub preferences: Preferences,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub tier: SubscriptionTier,
    pub weekly_session_limit: Option<u32>,
}

impl From<SubscriptionTier> for Subscription {
    fn from(tier: SubscriptionTier) -> Self {
        Self {
            tier,
            weekly_session_limit: tier.weekly_session_quota(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_sessions: u32,
    pub total_messages: u32,
    pub sessions_this_week: u32,
    pub streak_days: u32,
    pub last_session_date: Option<DateTime<Utc>>,
    pub average_mood: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub language: Language,
    pub notifications: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: Language::default(),
            notifications: true,
        }
    }
}

// -- Mood --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub mood: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodTrend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

// -- Chat --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Welcome,
    Text,
    Fallback,
    CrisisAlert,
}

/// One turn of a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, kind: Option<MessageKind>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            suggestions: None,
            kind,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Some(MessageKind::Text))
    }

    pub fn assistant(content: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(Role::Assistant, content, Some(kind))
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }
}

// -- Crisis resources --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisResource {
    pub name: String,
    pub contact: ResourceContact,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ResourceContact {
    Phone(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBundle {
    pub language: Language,
    pub message: String,
    pub resources: Vec<CrisisResource>,
    pub urgency: String,
    pub priority: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_quotas() {
        assert_eq!(SubscriptionTier::Free.weekly_session_quota(), Some(5));
        assert_eq!(SubscriptionTier::Basic.weekly_session_quota(), Some(20));
        assert_eq!(SubscriptionTier::Premium.weekly_session_quota(), None);
        assert_eq!("basic".parse::<SubscriptionTier>(), Ok(SubscriptionTier::Basic));
        assert!("gold".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn language_tags_fall_back_to_spanish() {
        assert_eq!(Language::from_tag("en-US"), Language::En);
        assert_eq!(Language::from_tag("EN"), Language::En);
        assert_eq!(Language::from_tag("es_MX"), Language::Es);
        assert_eq!(Language::from_tag("fr"), Language::Es);
        assert_eq!(Language::from_tag(""), Language::Es);
    }

    #[test]
    fn any_language_tag_deserializes() {
        let parse = |raw: &str| serde_json::from_str::<Language>(raw).unwrap();
        assert_eq!(parse("\"en\""), Language::En);
        assert_eq!(parse("\"en-US\""), Language::En);
        assert_eq!(parse("\"EN\""), Language::En);
        assert_eq!(parse("\"fr\""), Language::Es);
        assert_eq!(serde_json::to_value(Language::En).unwrap(), "en");

        let ctx: crate::api::ChatContext =
            serde_json::from_str(r#"{"language":"fr","mood":4}"#).unwrap();
        assert_eq!(ctx.language, Some(Language::Es));
    }

    #[test]
    fn message_kind_serializes_as_type() {
        let msg = ChatMessage::assistant("hola", MessageKind::CrisisAlert);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "crisis_alert");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("suggestions").is_none());
    }
}
