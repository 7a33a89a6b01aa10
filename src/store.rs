//! Quiz session persistence.
//!
//! One document per user key, single-document upserts only. There is no version
//! token, so two writers racing on the same key are last-writer-wins; in-process
//! writers are serialized by the quiz engine's per-key locks.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::QuizSession;
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SessionStore: Send + Sync {
  async fn get(&self, user_key: &str) -> StoreResult<Option<QuizSession>>;
  async fn put(&self, session: &QuizSession) -> StoreResult<()>;
  async fn delete(&self, user_key: &str) -> StoreResult<()>;
}

/// Pick a store from a connection string: `memory` or any `sqlite:` url.
pub async fn connect_store(url: &str) -> StoreResult<Arc<dyn SessionStore>> {
  if url.eq_ignore_ascii_case("memory") {
    info!(target: "narubot", "Using in-memory session store");
    return Ok(Arc::new(MemorySessionStore::default()));
  }
  if url.starts_with("sqlite:") {
    let store = SqliteSessionStore::connect(url).await?;
    return Ok(Arc::new(store));
  }
  Err(StoreError::UnsupportedUrl(url.to_string()))
}

#[derive(Default)]
pub struct MemorySessionStore {
  sessions: RwLock<HashMap<String, QuizSession>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
  async fn get(&self, user_key: &str) -> StoreResult<Option<QuizSession>> {
    Ok(self.sessions.read().await.get(user_key).cloned())
  }

  async fn put(&self, session: &QuizSession) -> StoreResult<()> {
    self.sessions.write().await.insert(session.user_key.clone(), session.clone());
    Ok(())
  }

  async fn delete(&self, user_key: &str) -> StoreResult<()> {
    self.sessions.write().await.remove(user_key);
    Ok(())
  }
}

/// Sessions stored as JSON documents in a single SQLite table.
pub struct SqliteSessionStore {
  pool: SqlitePool,
}

impl SqliteSessionStore {
  #[instrument(level = "info", skip_all)]
  pub async fn connect(url: &str) -> StoreResult<Self> {
    // In-memory SQLite is per-connection, so keep one connection there.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect(url)
      .await?;
    let store = Self { pool };
    store.initialize().await?;
    info!(target: "narubot", "SQLite session store ready");
    Ok(store)
  }

  async fn initialize(&self) -> StoreResult<()> {
    sqlx::query(
      "CREATE TABLE IF NOT EXISTS quiz_sessions (
         user_key TEXT PRIMARY KEY NOT NULL,
         document TEXT NOT NULL,
         updated_at TEXT NOT NULL
       )",
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
  #[instrument(level = "debug", skip(self))]
  async fn get(&self, user_key: &str) -> StoreResult<Option<QuizSession>> {
    let row = sqlx::query("SELECT document FROM quiz_sessions WHERE user_key = ?")
      .bind(user_key)
      .fetch_optional(&self.pool)
      .await?;

    match row {
      Some(row) => {
        let doc: String = row.try_get("document")?;
        Ok(Some(serde_json::from_str(&doc)?))
      }
      None => Ok(None),
    }
  }

  #[instrument(level = "debug", skip(self, session), fields(user_key = %session.user_key, q_no = session.current_q_no))]
  async fn put(&self, session: &QuizSession) -> StoreResult<()> {
    let doc = serde_json::to_string(session)?;
    sqlx::query(
      "INSERT INTO quiz_sessions (user_key, document, updated_at) VALUES (?, ?, ?)
       ON CONFLICT(user_key) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
    )
    .bind(&session.user_key)
    .bind(doc)
    .bind(session.last_updated.to_rfc3339())
    .execute(&self.pool)
    .await?;
    debug!(target: "quiz", "Session saved");
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn delete(&self, user_key: &str) -> StoreResult<()> {
    sqlx::query("DELETE FROM quiz_sessions WHERE user_key = ?")
      .bind(user_key)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}
