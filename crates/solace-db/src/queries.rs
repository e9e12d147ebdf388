use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use uuid::Uuid;

use solace_types::api::ProfileUpdate;

use crate::Database;
use crate::models::{
    MoodRow, MoodSummary, NewUser, SessionStart, UserRow, format_timestamp, parse_timestamp,
};

/// Mood samples kept per user; older entries are evicted first.
pub const MOOD_HISTORY_LIMIT: usize = 100;

const USER_COLUMNS: &str = "id, name, email, password, age, gender, tier, language, notifications,
    total_sessions, total_messages, sessions_this_week, streak_days, last_session_date,
    is_active, login_attempts, lock_until, last_login, created_at,
    (SELECT AVG(mood) FROM mood_entries WHERE mood_entries.user_id = users.id)";

impl Database {
    // -- Users --

    /// Insert a new user. Returns `false` if the email (case-insensitive) is taken.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<bool> {
        let result = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, age, gender, language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.email.to_lowercase(),
                    user.password_hash,
                    user.age,
                    user.gender,
                    user.language.as_str(),
                    format_timestamp(Utc::now()),
                ],
            )
            .map_err(anyhow::Error::from)
        });

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email.to_lowercase()))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id.to_string()))
    }

    /// Count a failed login. Once `max_attempts` is reached the account is
    /// locked for `lock_for` and the counter starts over.
    /// Returns the lock expiry if this attempt triggered a lock.
    pub fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: u32,
        lock_for: Duration,
    ) -> Result<Option<DateTime<Utc>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let attempts: i64 = tx.query_row(
                "UPDATE users SET login_attempts = login_attempts + 1 WHERE id = ?1
                 RETURNING login_attempts",
                [id.to_string()],
                |row| row.get(0),
            )?;

            let locked_until = if attempts >= i64::from(max_attempts) {
                let until = Utc::now() + lock_for;
                tx.execute(
                    "UPDATE users SET login_attempts = 0, lock_until = ?2 WHERE id = ?1",
                    params![id.to_string(), format_timestamp(until)],
                )?;
                Some(until)
            } else {
                None
            };

            tx.commit()?;
            Ok(locked_until)
        })
    }

    pub fn record_successful_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET login_attempts = 0, lock_until = NULL, last_login = ?2
                 WHERE id = ?1",
                params![id.to_string(), format_timestamp(at)],
            )?;
            Ok(())
        })
    }

    /// Apply a partial profile update; absent fields keep their value.
    pub fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<()> {
        let prefs = update.preferences.as_ref();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    age = COALESCE(?3, age),
                    gender = COALESCE(?4, gender),
                    language = COALESCE(?5, language),
                    notifications = COALESCE(?6, notifications)
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    update.name.as_deref().map(str::trim),
                    update.age,
                    update.gender.as_deref(),
                    prefs.and_then(|p| p.language).map(|l| l.as_str()),
                    prefs.and_then(|p| p.notifications),
                ],
            )?;
            Ok(())
        })
    }

    /// Soft delete: the row stays, the account stops working.
    pub fn deactivate_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET is_active = 0, deleted_at = ?2 WHERE id = ?1",
                params![id.to_string(), format_timestamp(at)],
            )?;
            tx.execute(
                "UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ?1",
                [id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Usage counters --

    pub fn increment_message_count(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET total_messages = total_messages + 1, last_activity = ?2
                 WHERE id = ?1",
                params![id.to_string(), format_timestamp(at)],
            )?;
            anyhow::ensure!(changed == 1, "user {} not found", id);
            Ok(())
        })
    }

    pub fn apply_session_start(&self, id: Uuid, start: &SessionStart) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    total_sessions = total_sessions + 1,
                    sessions_this_week = CASE WHEN ?2 THEN 1 ELSE sessions_this_week + 1 END,
                    streak_days = ?3,
                    last_session_date = ?4,
                    last_activity = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    start.reset_week,
                    start.streak_days,
                    format_timestamp(start.at),
                ],
            )?;
            anyhow::ensure!(changed == 1, "user {} not found", id);
            Ok(())
        })
    }

    pub fn insert_crisis_event(&self, user_id: Uuid, severity: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO crisis_events (user_id, severity, created_at) VALUES (?1, ?2, ?3)",
                params![user_id.to_string(), severity, format_timestamp(at)],
            )?;
            Ok(())
        })
    }

    pub fn count_crisis_events(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM crisis_events WHERE user_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    // -- Mood --

    /// Append a mood sample and evict anything beyond the newest
    /// `MOOD_HISTORY_LIMIT` entries for that user.
    pub fn insert_mood(
        &self,
        user_id: Uuid,
        mood: u8,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<MoodSummary> {
        let uid = user_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO mood_entries (user_id, mood, note, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![uid, mood, note, format_timestamp(at)],
            )?;
            tx.execute(
                "DELETE FROM mood_entries
                 WHERE user_id = ?1
                   AND id NOT IN (
                       SELECT id FROM mood_entries WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
                   )",
                params![uid, MOOD_HISTORY_LIMIT as i64],
            )?;
            let summary = tx.query_row(
                "SELECT COALESCE(AVG(mood), 0), COUNT(*) FROM mood_entries WHERE user_id = ?1",
                [&uid],
                |row| {
                    Ok(MoodSummary {
                        average: row.get(0)?,
                        count: row.get::<_, i64>(1)? as usize,
                    })
                },
            )?;
            tx.commit()?;
            Ok(summary)
        })
    }

    /// The newest `limit` entries, returned oldest first.
    pub fn get_mood_entries(&self, user_id: Uuid, limit: usize) -> Result<Vec<MoodRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, mood, note, recorded_at FROM (
                     SELECT id, mood, note, recorded_at FROM mood_entries
                     WHERE user_id = ?1
                     ORDER BY id DESC
                     LIMIT ?2
                 ) ORDER BY id ASC",
            )?;

            let rows = stmt
                .query_map(params![user_id.to_string(), limit as i64], |row| {
                    Ok(MoodRow {
                        id: row.get(0)?,
                        mood: row.get(1)?,
                        note: row.get(2)?,
                        recorded_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Refresh tokens --

    pub fn store_refresh_token(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_hash, user_id.to_string(), format_timestamp(expires_at)],
            )?;
            Ok(())
        })
    }

    /// Revoke a refresh token and return its owner, if it was live.
    /// A token can be consumed at most once.
    pub fn consume_refresh_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let found: Option<(String, String)> = tx
                .query_row(
                    "SELECT user_id, expires_at FROM refresh_tokens
                     WHERE token_hash = ?1 AND revoked = 0",
                    [token_hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((user_id, expires_at)) = found else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE refresh_tokens SET revoked = 1 WHERE token_hash = ?1",
                [token_hash],
            )?;
            tx.commit()?;

            let live = parse_timestamp(&expires_at).is_some_and(|exp| exp > now);
            if !live {
                return Ok(None);
            }
            Ok(Some(user_id.parse()?))
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        age: row.get(4)?,
        gender: row.get(5)?,
        tier: row.get(6)?,
        language: row.get(7)?,
        notifications: row.get(8)?,
        total_sessions: row.get(9)?,
        total_messages: row.get(10)?,
        sessions_this_week: row.get(11)?,
        streak_days: row.get(12)?,
        last_session_date: row.get(13)?,
        is_active: row.get(14)?,
        login_attempts: row.get(15)?,
        lock_until: row.get(16)?,
        last_login: row.get(17)?,
        created_at: row.get(18)?,
        average_mood: row.get(19)?,
    })
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
    )
}
