use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, mood entries, refresh tokens)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                email               TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password            TEXT NOT NULL,
                age                 INTEGER,
                gender              TEXT,
                tier                TEXT NOT NULL DEFAULT 'free',
                language            TEXT NOT NULL DEFAULT 'es',
                notifications       INTEGER NOT NULL DEFAULT 1,
                total_sessions      INTEGER NOT NULL DEFAULT 0,
                total_messages      INTEGER NOT NULL DEFAULT 0,
                sessions_this_week  INTEGER NOT NULL DEFAULT 0,
                streak_days         INTEGER NOT NULL DEFAULT 0,
                last_session_date   TEXT,
                last_activity       TEXT,
                is_active           INTEGER NOT NULL DEFAULT 1,
                deleted_at          TEXT,
                login_attempts      INTEGER NOT NULL DEFAULT 0,
                lock_until          TEXT,
                last_login          TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE mood_entries (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      TEXT NOT NULL REFERENCES users(id),
                mood         INTEGER NOT NULL CHECK (mood BETWEEN 1 AND 10),
                note         TEXT,
                recorded_at  TEXT NOT NULL
            );

            CREATE INDEX idx_mood_entries_user
                ON mood_entries(user_id, id);

            CREATE TABLE refresh_tokens (
                token_hash  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                expires_at  TEXT NOT NULL,
                revoked     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (crisis events)");
        conn.execute_batch(
            "
            CREATE TABLE crisis_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL REFERENCES users(id),
                severity    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_crisis_events_user
                ON crisis_events(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
