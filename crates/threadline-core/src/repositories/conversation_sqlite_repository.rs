use std::path::Path;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::conversation_repository::{
    BoxFuture, ConversationRepository, MessageOrder, MessageQuery,
};
use super::error::RepositoryResult;
use crate::models::{ConversationMessage, Session};

/// Migrations applied in order. Each entry is (version, sql).
/// Append new versions; never edit or remove existing entries.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS sessions (
        id         TEXT    PRIMARY KEY,
        body       TEXT    NOT NULL,
        updated_at INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_updated_at
        ON sessions (updated_at DESC);
    CREATE TABLE IF NOT EXISTS messages (
        id         TEXT    PRIMARY KEY,
        session_id TEXT    NOT NULL,
        created_at INTEGER NOT NULL DEFAULT 0,
        body       TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_session_created
        ON messages (session_id, created_at)",
)];

const UPSERT_MESSAGE: &str = "INSERT INTO messages (id, session_id, created_at, body)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(id) DO UPDATE SET
        session_id = excluded.session_id,
        created_at = excluded.created_at,
        body       = excluded.body";

/// SQLite-backed conversation store.
///
/// Sessions and messages are stored as JSON bodies next to the columns the
/// queries filter and sort on. WAL mode keeps reads available while
/// background saves are in flight.
#[derive(Clone)]
pub struct ConversationSqliteRepository {
    pool: SqlitePool,
}

impl ConversationSqliteRepository {
    /// Open (or create) the database at `db_path`
    pub async fn open(db_path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(path = %db_path.display(), "Opened SQLite conversation database");

        Ok(Self { pool })
    }

    /// Create the schema_version table if absent, then apply pending migrations
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)")
            .execute(pool)
            .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // One statement per query call
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(
    rows: &[sqlx::sqlite::SqliteRow],
) -> RepositoryResult<Vec<T>> {
    rows.iter()
        .map(|row| -> RepositoryResult<T> {
            let body: String = row.get("body");
            Ok(serde_json::from_str(&body)?)
        })
        .collect()
}

impl ConversationRepository for ConversationSqliteRepository {
    fn get_messages(
        &self,
        session_id: &str,
        query: MessageQuery,
    ) -> BoxFuture<'static, RepositoryResult<Vec<ConversationMessage>>> {
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        Box::pin(async move {
            let direction = match query.order {
                MessageOrder::NewestFirst => "DESC",
                MessageOrder::OldestFirst => "ASC",
            };
            let sql = format!(
                "SELECT body FROM messages
                 WHERE session_id = ?1 AND (?2 IS NULL OR created_at < ?2)
                 ORDER BY created_at {direction}, id {direction}
                 LIMIT ?3"
            );
            let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

            let rows = sqlx::query(&sql)
                .bind(&session_id)
                .bind(query.before)
                .bind(limit)
                .fetch_all(&pool)
                .await?;

            decode_rows(&rows)
        })
    }

    fn save_message(
        &self,
        message: ConversationMessage,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let body = serde_json::to_string(&message)?;
            sqlx::query(UPSERT_MESSAGE)
                .bind(&message.id)
                .bind(&message.session_id)
                .bind(message.created_at)
                .bind(&body)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn save_message_batch(
        &self,
        messages: Vec<ConversationMessage>,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await?;
            for message in &messages {
                let body = serde_json::to_string(message)?;
                sqlx::query(UPSERT_MESSAGE)
                    .bind(&message.id)
                    .bind(&message.session_id)
                    .bind(message.created_at)
                    .bind(&body)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn delete_message(
        &self,
        session_id: &str,
        id: &str,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let id = id.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM messages WHERE id = ?1 AND session_id = ?2")
                .bind(&id)
                .bind(&session_id)
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn get_session(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Session>>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT body FROM sessions WHERE id = ?")
                .bind(&id)
                .fetch_optional(&pool)
                .await?;

            match row {
                Some(row) => {
                    let body: String = row.get("body");
                    Ok(Some(serde_json::from_str(&body)?))
                }
                None => Ok(None),
            }
        })
    }

    fn list_sessions(&self) -> BoxFuture<'static, RepositoryResult<Vec<Session>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows = sqlx::query("SELECT body FROM sessions ORDER BY updated_at DESC")
                .fetch_all(&pool)
                .await?;

            decode_rows(&rows)
        })
    }

    fn update_session(&self, session: Session) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let body = serde_json::to_string(&session)?;
            sqlx::query(
                "INSERT INTO sessions (id, body, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    body       = excluded.body,
                    updated_at = excluded.updated_at",
            )
            .bind(&session.id)
            .bind(&body)
            .bind(session.updated_at)
            .execute(&pool)
            .await?;
            Ok(())
        })
    }

    fn delete_session(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM messages WHERE session_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
    }
}
