//! SQLite-backed [`ConversationStore`].
//!
//! Turns live in a `turns` table keyed by `(session_id, position)`. The next
//! position is computed inside the INSERT itself, within a transaction that
//! starts with a write, so concurrent appends to one session serialize on
//! SQLite's write lock instead of racing a read-modify-write cycle.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use super::{ConversationStore, StoreError, Turn};

#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Connects (or creates) the database at `database_url`, e.g.
    /// `sqlite://docparley.db`, runs embedded migrations, and switches the
    /// journal to WAL so readers never block the writer.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|source| StoreError::Connect { source })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Connect { source })?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for tests that want to inspect rows directly.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    #[instrument(skip(self), err)]
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT question, answer
            FROM turns
            WHERE session_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            turns.push(Turn {
                question: row.try_get("question")?,
                answer: row.try_get("answer")?,
            });
        }
        Ok(turns)
    }

    #[instrument(skip(self, turn), err)]
    async fn append(&self, session_id: &str, turn: Turn) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // First statement is a write, so the transaction takes the database
        // write lock immediately instead of upgrading from a read later.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (session_id)
            VALUES (?1)
            "#,
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO turns (session_id, position, question, answer)
            VALUES (
                ?1,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM turns WHERE session_id = ?1),
                ?2,
                ?3
            )
            "#,
        )
        .bind(session_id)
        .bind(&turn.question)
        .bind(&turn.answer)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
