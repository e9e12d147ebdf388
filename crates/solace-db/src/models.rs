//! Database row types. These map directly to SQLite rows.
//! Distinct from solace-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use solace_types::models::{
    Language, MoodEntry, Preferences, SubscriptionTier, User, UserStats,
};

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub tier: String,
    pub language: String,
    pub notifications: bool,
    pub total_sessions: i64,
    pub total_messages: i64,
    pub sessions_this_week: i64,
    pub streak_days: i64,
    pub last_session_date: Option<String>,
    pub is_active: bool,
    pub login_attempts: i64,
    pub lock_until: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub average_mood: Option<f64>,
}

impl UserRow {
    pub fn tier(&self) -> SubscriptionTier {
        self.tier.parse().unwrap_or_else(|e| {
            warn!("Corrupt tier on user '{}': {}", self.id, e);
            SubscriptionTier::Free
        })
    }

    pub fn language(&self) -> Language {
        Language::from_tag(&self.language)
    }

    pub fn last_session_date(&self) -> Option<DateTime<Utc>> {
        self.last_session_date.as_deref().and_then(parse_timestamp)
    }

    pub fn lock_until(&self) -> Option<DateTime<Utc>> {
        self.lock_until.as_deref().and_then(parse_timestamp)
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until().is_some_and(|until| until > now)
    }

    /// Public view of the row, without the password hash or lockout state.
    pub fn to_user(&self) -> User {
        let tier = self.tier();
        User {
            id: self.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt user id '{}': {}", self.id, e);
                Uuid::default()
            }),
            name: self.name.clone(),
            email: self.email.clone(),
            age: self.age.and_then(|a| u8::try_from(a).ok()),
            gender: self.gender.clone(),
            subscription: tier.into(),
            stats: UserStats {
                total_sessions: clamp_u32(self.total_sessions),
                total_messages: clamp_u32(self.total_messages),
                sessions_this_week: clamp_u32(self.sessions_this_week),
                streak_days: clamp_u32(self.streak_days),
                last_session_date: self.last_session_date(),
                average_mood: self.average_mood.map(round_tenth),
            },
            preferences: Preferences {
                language: self.language(),
                notifications: self.notifications,
            },
            is_active: self.is_active,
            last_login: self.last_login.as_deref().and_then(parse_timestamp),
            created_at: parse_timestamp(&self.created_at).unwrap_or_else(|| {
                warn!("Corrupt created_at '{}' on user '{}'", self.created_at, self.id);
                DateTime::default()
            }),
        }
    }
}

pub struct NewUser<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub age: Option<u8>,
    pub gender: Option<&'a str>,
    pub language: Language,
}

pub struct MoodRow {
    pub id: i64,
    pub mood: i64,
    pub note: Option<String>,
    pub recorded_at: String,
}

impl MoodRow {
    pub fn to_entry(&self) -> MoodEntry {
        MoodEntry {
            mood: u8::try_from(self.mood).unwrap_or_default(),
            note: self.note.clone(),
            recorded_at: parse_timestamp(&self.recorded_at).unwrap_or_else(|| {
                warn!("Corrupt recorded_at '{}' on mood entry {}", self.recorded_at, self.id);
                DateTime::default()
            }),
        }
    }
}

/// Aggregate over the stored (post-eviction) mood entries of one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodSummary {
    pub average: f64,
    pub count: usize,
}

/// Counter changes applied when a chat session starts.
#[derive(Debug, Clone, Copy)]
pub struct SessionStart {
    pub at: DateTime<Utc>,
    pub streak_days: u32,
    /// The previous session fell in an earlier week; restart the weekly count.
    pub reset_week: bool,
}

/// Timestamps are written as RFC 3339 with second precision and a `Z` suffix,
/// which keeps them lexicographically ordered.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite defaults are "YYYY-MM-DD HH:MM:SS" without timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
