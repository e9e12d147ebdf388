use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use solace_db::{Database, SessionStart};
use solace_types::models::{Language, MoodTrend, SubscriptionTier};

use crate::crisis::CrisisSeverity;

/// Per-user bookkeeping the dispatcher needs. Failures are reported, and the
/// dispatcher decides they are not fatal.
pub trait UsageStore: Send + Sync {
    fn preferred_language(&self, user_id: Uuid) -> anyhow::Result<Option<Language>>;
    fn record_exchange(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
    fn record_session_start(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
    fn record_crisis(
        &self,
        user_id: Uuid,
        severity: CrisisSeverity,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

impl UsageStore for Database {
    fn preferred_language(&self, user_id: Uuid) -> anyhow::Result<Option<Language>> {
        Ok(self.get_user_by_id(user_id)?.map(|row| row.language()))
    }

    fn record_exchange(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.increment_message_count(user_id, at)
    }

    fn record_session_start(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        let row = self
            .get_user_by_id(user_id)?
            .ok_or_else(|| anyhow::anyhow!("user {} not found", user_id))?;
        let last = row.last_session_date();
        let start = SessionStart {
            at,
            streak_days: next_streak(last, u32::try_from(row.streak_days).unwrap_or(0), at),
            reset_week: !last.is_some_and(|prev| same_week(prev, at)),
        };
        self.apply_session_start(user_id, &start)
    }

    fn record_crisis(
        &self,
        user_id: Uuid,
        severity: CrisisSeverity,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.insert_crisis_event(user_id, severity.as_str(), at)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("weekly session limit reached ({used}/{limit}) for the {} plan", .tier.as_str())]
pub struct QuotaExceeded {
    pub tier: SubscriptionTier,
    pub limit: u32,
    pub used: u32,
}

fn same_week(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.iso_week() == b.iso_week()
}

/// Sessions counted against this week's quota. A stored count from an
/// earlier week no longer applies.
pub fn sessions_this_week(stored: u32, last_session: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    match last_session {
        Some(prev) if same_week(prev, now) => stored,
        _ => 0,
    }
}

/// Gate for starting a new session. On success returns the sessions left
/// after this one (`None` for unlimited plans).
pub fn ensure_session_quota(
    tier: SubscriptionTier,
    sessions_this_week: u32,
) -> Result<Option<u32>, QuotaExceeded> {
    match tier.weekly_session_quota() {
        None => Ok(None),
        Some(limit) if sessions_this_week >= limit => Err(QuotaExceeded {
            tier,
            limit,
            used: sessions_this_week,
        }),
        Some(limit) => Ok(Some(limit - sessions_this_week - 1)),
    }
}

/// Consecutive-day streak after a session at `now`.
pub fn next_streak(last_session: Option<DateTime<Utc>>, current: u32, now: DateTime<Utc>) -> u32 {
    let Some(prev) = last_session else {
        return 1;
    };
    let days = now.date_naive().signed_duration_since(prev.date_naive()).num_days();
    match days {
        0 => current.max(1),
        1 => current + 1,
        _ => 1,
    }
}

/// Compare the mean of the newest samples against the samples just before
/// them (up to 7 each). `moods` is oldest first.
pub fn mood_trend(moods: &[u8]) -> MoodTrend {
    const WINDOW: usize = 7;
    const THRESHOLD: f64 = 0.5;

    let n = WINDOW.min(moods.len() / 2);
    if n == 0 {
        return MoodTrend::InsufficientData;
    }

    let mean = |s: &[u8]| s.iter().map(|&m| f64::from(m)).sum::<f64>() / s.len() as f64;
    let recent = &moods[moods.len() - n..];
    let previous = &moods[moods.len() - 2 * n..moods.len() - n];
    let delta = mean(recent) - mean(previous);

    if delta > THRESHOLD {
        MoodTrend::Improving
    } else if delta < -THRESHOLD {
        MoodTrend::Declining
    } else {
        MoodTrend::Stable
    }
}
