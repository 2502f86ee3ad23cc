//! Durable storage for sessions, their messages, and tool invocations.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::message::{Message, ToolInvocation};
use crate::core::session::{NewSession, Session, SessionSummary};

pub mod sqlite;

pub use sqlite::SqliteSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open session database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to create data directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Database error while {context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Corrupt {field} in session database: {message}")]
    Corrupt { field: &'static str, message: String },
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session id prefix '{0}' matches more than one session")]
    Ambiguous(String),
}

impl StoreError {
    pub(crate) fn database(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |source| StoreError::Database { context, source }
    }

    pub(crate) fn corrupt(field: &'static str, message: impl ToString) -> StoreError {
        StoreError::Corrupt {
            field,
            message: message.to_string(),
        }
    }
}

/// Persistence contract for sessions.
///
/// Messages are append-only: once written they are never modified, and each
/// receives the next dense sequence number (starting at 1) for its session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, settings: NewSession) -> Result<Session, StoreError>;

    /// Load a session with all of its messages, or `None` if it does not exist.
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Persist a session's name and model settings. Messages are untouched.
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Returns whether a session was removed.
    async fn delete_session(&self, id: &str) -> Result<bool, StoreError>;

    /// All sessions, most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    /// Expand a full id or unique id prefix to the full session id.
    async fn resolve_session_id(&self, id_or_prefix: &str) -> Result<String, StoreError>;

    /// Append a message and return its sequence number.
    async fn append_message(&self, session_id: &str, message: &Message)
        -> Result<u64, StoreError>;

    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;

    async fn record_tool_invocation(
        &self,
        session_id: &str,
        invocation: &ToolInvocation,
    ) -> Result<(), StoreError>;

    async fn tool_invocations(&self, session_id: &str)
        -> Result<Vec<ToolInvocation>, StoreError>;
}
