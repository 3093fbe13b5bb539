//! Durable conversation memory, keyed by session.
//!
//! A session's history is an ordered list of question/answer [`Turn`]s.
//! Appends go through [`ConversationStore::append`], which creates the
//! session on first write; loads return turns oldest-first. The SQLite
//! implementation lives in [`sqlite`](crate::stores::sqlite).

pub mod sqlite;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteConversationStore;

/// One completed exchange: what the user asked and what was answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("failed to open conversation database: {source}")]
    #[diagnostic(
        code(docparley::store::connect),
        help("Check DATABASE_URL and that the database file's directory is writable.")
    )]
    Connect {
        #[source]
        source: sqlx::Error,
    },

    #[error("conversation schema migration failed: {0}")]
    #[diagnostic(code(docparley::store::migrate))]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("conversation query failed: {0}")]
    #[diagnostic(code(docparley::store::query))]
    Query(#[from] sqlx::Error),
}

/// Session-scoped persistence for chat history.
///
/// Implementations must keep each append atomic: concurrent appends to the
/// same session may interleave in either order but never overwrite one
/// another, and positions within a session stay gapless.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the session's turns oldest-first. Unknown sessions are simply
    /// empty, not an error.
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;

    /// Appends one turn to the end of the session's history, creating the
    /// session if this is its first turn.
    async fn append(&self, session_id: &str, turn: Turn) -> Result<(), StoreError>;
}
