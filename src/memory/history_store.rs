//! Durable chat history
//!
//! Append-only message log per session. Two interchangeable SQL backends
//! share the same table layout and query semantics.

use crate::config::{HistoryStoreKind, Settings};
use crate::error::ChatError;
use crate::models::{Role, SessionSummary, StoredMessage};
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Default page size for `get_messages`
pub const DEFAULT_MESSAGE_PAGE: i64 = 200;
/// Default page size for `list_sessions`
pub const DEFAULT_SESSION_PAGE: i64 = 100;

/// Trait for the durable message log
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the table and index if they do not exist yet
    async fn ensure_schema(&self) -> Result<()>;

    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()>;

    /// Messages in insertion order, paginated
    async fn get_messages(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredMessage>>;

    /// The latest `limit` messages, oldest first
    async fn get_recent_messages(&self, session_id: &str, limit: i64)
        -> Result<Vec<StoredMessage>>;

    /// Sessions ordered by most recent activity
    async fn list_sessions(&self, limit: i64, offset: i64) -> Result<Vec<SessionSummary>>;
}

/// Build the configured history backend, or `None` when disabled
pub async fn create_history_store(settings: &Settings) -> Result<Option<Arc<dyn HistoryStore>>> {
    match settings.history_store {
        HistoryStoreKind::Sqlite => {
            let store = SqliteHistoryStore::connect(&settings.sqlite_path).await?;
            info!(path = %settings.sqlite_path.display(), "Chat history backend: sqlite");
            Ok(Some(Arc::new(store)))
        }
        HistoryStoreKind::Postgres => {
            let dsn = settings.postgres_dsn.as_deref().ok_or_else(|| {
                ChatError::Config("Missing required config key: postgres_dsn".to_string())
            })?;
            let store = PostgresHistoryStore::connect(dsn).await?;
            info!("Chat history backend: postgres");
            Ok(Some(Arc::new(store)))
        }
        HistoryStoreKind::None => {
            info!("Chat history backend: disabled");
            Ok(None)
        }
    }
}

fn db_error(action: &str, e: sqlx::Error) -> ChatError {
    ChatError::Database(format!("Failed to {}: {}", action, e))
}

// =============================
// SQLite
// =============================

/// SQLite timestamps are stored as text with millisecond precision
const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const SQLITE_ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (creating if missing) the database file and ensure the schema
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("open sqlite history database", e))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Accepts SQLite's `YYYY-MM-DD HH:MM:SS[.fff]`, the `T`-separated form, and RFC 3339
    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, SQLITE_ISO_TIMESTAMP_FORMAT))
            .map(|naive| naive.and_utc())
            .map_err(|e| ChatError::Database(format!("Invalid created_at {}: {}", raw, e)))
    }

    fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage> {
        let role: String = row.try_get("role")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(StoredMessage {
            role: Role::from_db(&role),
            content: row.try_get("content")?,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              session_id TEXT NOT NULL,
              role TEXT NOT NULL,
              content TEXT NOT NULL,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create chat_messages table", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session_id ON chat_messages (session_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create chat_messages index", e))?;

        Ok(())
    }

    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        sqlx::query("INSERT INTO chat_messages (session_id, role, content) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(role.as_str())
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("append chat message", e))?;
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at
            FROM chat_messages
            WHERE session_id = ?1
            ORDER BY id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load chat messages", e))?;

        rows.iter().map(Self::message_from_row).collect()
    }

    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at
            FROM chat_messages
            WHERE session_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load recent chat messages", e))?;

        let mut messages = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn list_sessions(&self, limit: i64, offset: i64) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
              session_id,
              MIN(created_at) AS started_at,
              MAX(created_at) AS last_at,
              MAX(id) AS last_id,
              (
                SELECT content
                FROM chat_messages m2
                WHERE m2.session_id = m1.session_id AND m2.role = 'user'
                ORDER BY id ASC
                LIMIT 1
              ) AS title
            FROM chat_messages m1
            GROUP BY session_id
            ORDER BY last_at DESC, last_id DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list chat sessions", e))?;

        rows.iter()
            .map(|row| {
                let started_at: String = row.try_get("started_at")?;
                let last_at: String = row.try_get("last_at")?;
                Ok(SessionSummary {
                    session_id: row.try_get("session_id")?,
                    started_at: Self::parse_timestamp(&started_at)?,
                    last_at: Self::parse_timestamp(&last_at)?,
                    title: row.try_get("title")?,
                })
            })
            .collect()
    }
}

// =============================
// Postgres
// =============================

pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Create a lazily-connected pool and ensure the schema
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(dsn)
            .map_err(|e| db_error("configure postgres pool", e))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredMessage> {
        let role: String = row.try_get("role")?;
        Ok(StoredMessage {
            role: Role::from_db(&role),
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait::async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
              id SERIAL PRIMARY KEY,
              session_id TEXT NOT NULL,
              role TEXT NOT NULL,
              content TEXT NOT NULL,
              created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create chat_messages table", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session_id ON chat_messages (session_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create chat_messages index", e))?;

        Ok(())
    }

    async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        sqlx::query("INSERT INTO chat_messages (session_id, role, content) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(role.as_str())
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("append chat message", e))?;
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load chat messages", e))?;

        rows.iter().map(Self::message_from_row).collect()
    }

    async fn get_recent_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load recent chat messages", e))?;

        let mut messages = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn list_sessions(&self, limit: i64, offset: i64) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
              session_id,
              MIN(created_at) AS started_at,
              MAX(created_at) AS last_at,
              MAX(id) AS last_id,
              (
                SELECT content
                FROM chat_messages m2
                WHERE m2.session_id = m1.session_id AND m2.role = 'user'
                ORDER BY id ASC
                LIMIT 1
              ) AS title
            FROM chat_messages m1
            GROUP BY session_id
            ORDER BY last_at DESC, last_id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list chat sessions", e))?;

        rows.iter()
            .map(|row| {
                Ok(SessionSummary {
                    session_id: row.try_get("session_id")?,
                    started_at: row.try_get("started_at")?,
                    last_at: row.try_get("last_at")?,
                    title: row.try_get("title")?,
                })
            })
            .collect()
    }
}
