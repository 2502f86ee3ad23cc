use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use crate::core::config::data::path_display;
use crate::core::message::{Message, Role, ToolCall, ToolInvocation};
use crate::core::parameters::{ModelParameters, ResponseFormat};
use crate::core::session::{NewSession, Session, SessionSummary};
use crate::core::store::{SessionStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    model         TEXT NOT NULL,
    system_prompt TEXT,
    parameters    TEXT NOT NULL,
    format        TEXT NOT NULL,
    keep_alive    INTEGER NOT NULL,
    tools         TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    touched       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_touched ON sessions (touched DESC);

CREATE TABLE IF NOT EXISTS messages (
    session_id TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
    seq        INTEGER NOT NULL,
    role       TEXT NOT NULL,
    content    TEXT NOT NULL,
    images     TEXT NOT NULL,
    tool_calls TEXT NOT NULL,
    tool_name  TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (session_id, seq)
);

CREATE TABLE IF NOT EXISTS tool_invocations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
    message_seq INTEGER NOT NULL,
    name        TEXT NOT NULL,
    arguments   TEXT NOT NULL,
    result      TEXT NOT NULL,
    is_error    INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tool_invocations_session
    ON tool_invocations (session_id, id);
"#;

/// Monotonic recency counter; timestamps alone can tie within a millisecond.
const NEXT_TOUCH: &str = "(SELECT COALESCE(MAX(touched), 0) + 1 FROM sessions)";

/// SQLite implementation of [`SessionStore`].
///
/// The pool holds a single connection, so writes are serialized.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: path_display(parent),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Open {
                path: path_display(path),
                source,
            })?;

        debug!(path = %path.display(), "opened session database");
        Self::with_pool(pool).await
    }

    /// A private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let open_error = |source: sqlx::Error| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        };
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(open_error)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(open_error)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(StoreError::database("creating schema"))?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn ensure_session(conn: &mut SqliteConnection, session_id: &str) -> Result<(), StoreError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE id = ?1")
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::database("looking up session"))?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(session_id.to_string())),
    }
}

fn to_json<T: serde::Serialize>(field: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::corrupt(field, err))
}

fn from_json<T: serde::de::DeserializeOwned>(
    field: &'static str,
    text: &str,
) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|err| StoreError::corrupt(field, err))
}

fn column<'r, T>(row: &'r SqliteRow, name: &'static str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|err| StoreError::corrupt(name, err))
}

fn session_from_row(row: &SqliteRow, messages: Vec<Message>) -> Result<Session, StoreError> {
    let format: String = column(row, "format")?;
    let keep_alive: i64 = column(row, "keep_alive")?;
    Ok(Session {
        id: column(row, "id")?,
        name: column(row, "name")?,
        model: column(row, "model")?,
        system: column(row, "system_prompt")?,
        parameters: from_json::<ModelParameters>("parameters", &column::<String>(row, "parameters")?)?,
        format: ResponseFormat::from_str(&format)
            .map_err(|err| StoreError::corrupt("format", err))?,
        keep_alive: u32::try_from(keep_alive)
            .map_err(|err| StoreError::corrupt("keep_alive", err))?,
        tools: from_json("tools", &column::<String>(row, "tools")?)?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        messages,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message, StoreError> {
    let role: String = column(row, "role")?;
    Ok(Message {
        role: Role::try_from(role).map_err(|err| StoreError::corrupt("role", err))?,
        content: column(row, "content")?,
        images: from_json("images", &column::<String>(row, "images")?)?,
        tool_calls: from_json("tool_calls", &column::<String>(row, "tool_calls")?)?,
        tool_name: column(row, "tool_name")?,
        created_at: column(row, "created_at")?,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, settings: NewSession) -> Result<Session, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(&format!(
            r#"
            INSERT INTO sessions (id, name, model, system_prompt, parameters, format,
                                  keep_alive, tools, created_at, updated_at, touched)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, {NEXT_TOUCH})
            "#
        ))
        .bind(&id)
        .bind(&settings.name)
        .bind(&settings.model)
        .bind(&settings.system)
        .bind(to_json("parameters", &settings.parameters)?)
        .bind(settings.format.to_string())
        .bind(i64::from(settings.keep_alive))
        .bind(to_json("tools", &settings.tools)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database("creating session"))?;

        debug!(session = %id, model = %settings.model, "created session");

        Ok(Session {
            id,
            name: settings.name,
            model: settings.model,
            system: settings.system,
            parameters: settings.parameters,
            format: settings.format,
            keep_alive: settings.keep_alive,
            tools: settings.tools,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        })
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, model, system_prompt, parameters, format, keep_alive, tools,
                   created_at, updated_at
            FROM sessions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database("loading session"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages = self.messages(id).await?;
        session_from_row(&row, messages).map(Some)
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE sessions
            SET name = ?2, model = ?3, system_prompt = ?4, parameters = ?5, format = ?6,
                keep_alive = ?7, tools = ?8, updated_at = ?9, touched = {NEXT_TOUCH}
            WHERE id = ?1
            "#
        ))
        .bind(&session.id)
        .bind(&session.name)
        .bind(&session.model)
        .bind(&session.system)
        .bind(to_json("parameters", &session.parameters)?)
        .bind(session.format.to_string())
        .bind(i64::from(session.keep_alive))
        .bind(to_json("tools", &session.tools)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StoreError::database("updating session"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(session.id.clone()));
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database("deleting session"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.model, s.updated_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count
            FROM sessions s
            ORDER BY s.touched DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database("listing sessions"))?;

        rows.iter()
            .map(|row| {
                let count: i64 = column(row, "message_count")?;
                Ok(SessionSummary {
                    id: column(row, "id")?,
                    name: column(row, "name")?,
                    model: column(row, "model")?,
                    updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
                    message_count: count.max(0) as u64,
                })
            })
            .collect()
    }

    async fn resolve_session_id(&self, id_or_prefix: &str) -> Result<String, StoreError> {
        let prefix = id_or_prefix.trim();
        if prefix.is_empty() {
            return Err(StoreError::NotFound(id_or_prefix.to_string()));
        }

        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM sessions WHERE substr(id, 1, length(?1)) = ?1 LIMIT 2",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database("resolving session id"))?;

        match ids.as_slice() {
            [id] => Ok(id.clone()),
            [] => Err(StoreError::NotFound(prefix.to_string())),
            _ if ids.iter().any(|id| id == prefix) => Ok(prefix.to_string()),
            _ => Err(StoreError::Ambiguous(prefix.to_string())),
        }
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> Result<u64, StoreError> {
        let images = to_json("images", &message.images)?;
        let tool_calls = to_json("tool_calls", &message.tool_calls)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::database("starting transaction"))?;

        ensure_session(&mut *tx, session_id).await?;

        let seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::database("allocating message sequence"))?;

        sqlx::query(
            r#"
            INSERT INTO messages (session_id, seq, role, content, images, tool_calls,
                                  tool_name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(session_id)
        .bind(seq)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(images)
        .bind(tool_calls)
        .bind(&message.tool_name)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database("appending message"))?;

        sqlx::query(&format!(
            "UPDATE sessions SET updated_at = ?2, touched = {NEXT_TOUCH} WHERE id = ?1"
        ))
        .bind(session_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database("touching session"))?;

        tx.commit()
            .await
            .map_err(StoreError::database("committing message"))?;

        debug!(session = %session_id, seq, role = message.role.as_str(), "appended message");
        Ok(seq as u64)
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, images, tool_calls, tool_name, created_at
            FROM messages
            WHERE session_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database("loading messages"))?;

        rows.iter().map(message_from_row).collect()
    }

    async fn record_tool_invocation(
        &self,
        session_id: &str,
        invocation: &ToolInvocation,
    ) -> Result<(), StoreError> {
        let arguments = to_json("arguments", &invocation.call.arguments)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::database("starting transaction"))?;

        ensure_session(&mut *tx, session_id).await?;

        sqlx::query(
            r#"
            INSERT INTO tool_invocations (session_id, message_seq, name, arguments, result,
                                          is_error, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(session_id)
        .bind(invocation.message_seq as i64)
        .bind(&invocation.call.name)
        .bind(arguments)
        .bind(&invocation.result)
        .bind(invocation.is_error)
        .bind(invocation.created_at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database("recording tool invocation"))?;

        tx.commit()
            .await
            .map_err(StoreError::database("committing tool invocation"))
    }

    async fn tool_invocations(&self, session_id: &str) -> Result<Vec<ToolInvocation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT message_seq, name, arguments, result, is_error, created_at
            FROM tool_invocations
            WHERE session_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database("loading tool invocations"))?;

        rows.iter()
            .map(|row| {
                let seq: i64 = column(row, "message_seq")?;
                Ok(ToolInvocation {
                    call: ToolCall::new(
                        column::<String>(row, "name")?,
                        from_json("arguments", &column::<String>(row, "arguments")?)?,
                    ),
                    result: column(row, "result")?,
                    is_error: column(row, "is_error")?,
                    message_seq: seq.max(0) as u64,
                    created_at: column(row, "created_at")?,
                })
            })
            .collect()
    }
}
