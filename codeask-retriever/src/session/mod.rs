//! Named conversation sessions with sliding-window history.
//!
//! Sessions share the store's SQLite database. Each session holds its own
//! message history and a JSON blob of runtime overrides (for example a
//! per-session temperature). History is capped: an exchange is one
//! user+assistant pair, and the oldest messages beyond
//! `2 * max_history_length` are evicted on append.
//!
//! Which session is active, and whether history is fed to the model at all,
//! is process state: every startup begins on the `default` session with
//! context enabled.

use crate::error::SessionError;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

pub const DEFAULT_SESSION: &str = "default";
pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 10;

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// Manages named sessions and the active session's history.
pub struct ContextManager {
    pool: SqlitePool,
    active: String,
    context_enabled: bool,
    max_history_length: usize,
}

impl ContextManager {
    /// Set up session storage on the shared pool and ensure the `default`
    /// session exists. The `default` session is always active at startup.
    pub async fn new(pool: SqlitePool, max_history_length: usize) -> Result<Self, SessionError> {
        Self::create_tables(&pool).await?;

        let manager = Self {
            pool,
            active: DEFAULT_SESSION.to_string(),
            context_enabled: true,
            max_history_length,
        };
        manager.ensure_session(DEFAULT_SESSION).await?;
        Ok(manager)
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                name           TEXT PRIMARY KEY,
                created_at     INTEGER NOT NULL,
                overrides_json TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                session TEXT NOT NULL REFERENCES sessions(name) ON DELETE CASCADE,
                role    TEXT NOT NULL,
                content TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn ensure_session(&self, name: &str) -> Result<(), SessionError> {
        sqlx::query(
            "INSERT OR IGNORE INTO sessions (name, created_at) VALUES (?1, strftime('%s', 'now'))",
        )
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_exists(&self, name: &str) -> Result<bool, SessionError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE name = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub fn active_session(&self) -> &str {
        &self.active
    }

    pub fn context_enabled(&self) -> bool {
        self.context_enabled
    }

    /// Toggle whether history is recorded and fed to the model. Disabling
    /// never clears stored history.
    pub fn set_context_enabled(&mut self, enabled: bool) {
        self.context_enabled = enabled;
    }

    pub async fn create_session(&self, name: &str) -> Result<(), SessionError> {
        if self.session_exists(name).await? {
            return Err(SessionError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.ensure_session(name).await?;
        tracing::info!(session = name, "created session");
        Ok(())
    }

    pub async fn switch_session(&mut self, name: &str) -> Result<(), SessionError> {
        if !self.session_exists(name).await? {
            return Err(SessionError::NotFound {
                name: name.to_string(),
            });
        }
        self.active = name.to_string();
        tracing::info!(session = name, "switched session");
        Ok(())
    }

    /// Delete a non-active session and its messages.
    pub async fn delete_session(&self, name: &str) -> Result<(), SessionError> {
        if name == self.active {
            return Err(SessionError::ActiveSession {
                name: name.to_string(),
            });
        }
        if !self.session_exists(name).await? {
            return Err(SessionError::NotFound {
                name: name.to_string(),
            });
        }

        sqlx::query("DELETE FROM sessions WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        tracing::info!(session = name, "deleted session");
        Ok(())
    }

    /// Session names in creation order.
    pub async fn list_sessions(&self) -> Result<Vec<String>, SessionError> {
        let rows = sqlx::query("SELECT name FROM sessions ORDER BY created_at, name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    /// Record one question/answer exchange on the active session, evicting
    /// the oldest messages beyond the history cap. A no-op while context is
    /// disabled.
    pub async fn append_exchange(&self, user: &str, assistant: &str) -> Result<(), SessionError> {
        if !self.context_enabled {
            return Ok(());
        }

        let cap = (2 * self.max_history_length) as i64;
        let mut tx = self.pool.begin().await?;

        for (role, content) in [("user", user), ("assistant", assistant)] {
            sqlx::query("INSERT INTO messages (session, role, content) VALUES (?1, ?2, ?3)")
                .bind(&self.active)
                .bind(role)
                .bind(content)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            DELETE FROM messages WHERE session = ?1 AND id NOT IN (
                SELECT id FROM messages WHERE session = ?1 ORDER BY id DESC LIMIT ?2
            )
            "#,
        )
        .bind(&self.active)
        .bind(cap)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The active session's messages in chronological order.
    pub async fn history(&self) -> Result<Vec<Message>, SessionError> {
        let rows = sqlx::query(
            "SELECT role, content FROM messages WHERE session = ?1 ORDER BY id",
        )
        .bind(&self.active)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Message {
                role: row.get("role"),
                content: row.get("content"),
            })
            .collect())
    }

    /// Persist one runtime override on the active session. Overrides layer
    /// over the base configuration and never touch the config file.
    pub async fn set_runtime_override(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let mut overrides = self.overrides().await?;
        overrides.insert(key.to_string(), value);
        let json = serde_json::to_string(&overrides)?;

        sqlx::query("UPDATE sessions SET overrides_json = ?1 WHERE name = ?2")
            .bind(json)
            .bind(&self.active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Runtime overrides of the active session.
    pub async fn overrides(&self) -> Result<serde_json::Map<String, Value>, SessionError> {
        let json: String =
            sqlx::query_scalar("SELECT overrides_json FROM sessions WHERE name = ?1")
                .bind(&self.active)
                .fetch_one(&self.pool)
                .await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Remove every session and message, then recreate an empty `default`
    /// session and make it active. `list_sessions` therefore reports the
    /// fresh `default` rather than zero sessions: there is always exactly
    /// one active session.
    pub async fn purge_sessions(&mut self) -> Result<(), SessionError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sessions").execute(&mut *tx).await?;
        tx.commit().await?;

        self.active = DEFAULT_SESSION.to_string();
        self.ensure_session(DEFAULT_SESSION).await?;
        tracing::info!("purged all sessions");
        Ok(())
    }
}
