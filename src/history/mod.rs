//! Chat sessions and their ordered messages.
//!
//! Messages are append-only; the only mutation besides appending is
//! clearing a session's messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::llm::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: i64,
}

/// What survives of an upload: its extracted text, never the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// `document` or `image`.
    pub kind: String,
    pub format: String,
    pub filename: Option<String>,
    pub excerpt: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    pub metadata: Option<Value>,
    pub created_at: String,
}

impl Message {
    /// Text replayed to the model. User turns that carried attachments or
    /// context were sent as an assembled prompt, stored under
    /// `metadata.prompt`.
    pub fn model_text(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("prompt"))
            .and_then(Value::as_str)
            .unwrap_or(&self.content)
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<AttachmentMeta>,
    pub metadata: Option<Value>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentMeta>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                title TEXT NOT NULL DEFAULT 'New conversation',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                metadata TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init messages table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn create_session(
        &self,
        user_id: Option<&str>,
        title: &str,
    ) -> Result<String, ApiError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {}", e)))?;

        Ok(session_id)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionInfo>, ApiError> {
        let row = sqlx::query(
            "SELECT s.id, s.user_id, s.title, s.created_at, s.updated_at, \
             (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS msg_count \
             FROM sessions s WHERE s.id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// A session owned by someone else is reported as absent.
    pub async fn find_owned_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionInfo>, ApiError> {
        Ok(self
            .get_session(session_id)
            .await?
            .filter(|s| s.user_id.as_deref() == Some(user_id)))
    }

    /// Most recently updated first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT s.id, s.user_id, s.title, s.created_at, s.updated_at, \
             COUNT(m.id) AS msg_count \
             FROM sessions s \
             LEFT JOIN messages m ON s.id = m.session_id \
             WHERE s.user_id = ? \
             GROUP BY s.id \
             ORDER BY s.updated_at DESC, s.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    /// Appends in one transaction; a session row is created on first use.
    pub async fn append(&self, session_id: &str, message: NewMessage) -> Result<Message, ApiError> {
        let mut stored = self.append_turn(session_id, vec![message]).await?;
        stored
            .pop()
            .ok_or_else(|| ApiError::internal("append stored no message"))
    }

    /// Appends several messages atomically, in order. A chat turn is stored
    /// this way so a question is never kept without its answer.
    pub async fn append_turn(
        &self,
        session_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            let attachments =
                serde_json::to_string(&message.attachments).map_err(ApiError::internal)?;
            let metadata = message
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(ApiError::internal)?;

            let result = sqlx::query(
                "INSERT INTO messages (session_id, role, content, attachments, metadata, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&attachments)
            .bind(&metadata)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            stored.push(Message {
                id: result.last_insert_rowid(),
                session_id: session_id.to_string(),
                role: message.role,
                content: message.content,
                attachments: message.attachments,
                metadata: message.metadata,
                created_at: now.clone(),
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    pub async fn load(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        self.load_recent(session_id, 0).await
    }

    /// The last `limit` messages in order; `0` loads everything, which is
    /// what `load` relies on. The replay window is validated to be at least 1.
    pub async fn load_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM messages WHERE session_id = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC",
            )
            .bind(session_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query("SELECT * FROM messages WHERE session_id = ? ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?
        };

        rows.iter().map(row_to_message).collect()
    }

    /// Removes the session's messages; the session itself stays listed.
    pub async fn clear(&self, session_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn clear_user(&self, user_id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query(
            "DELETE FROM messages WHERE session_id IN (SELECT id FROM sessions WHERE user_id = ?)",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionInfo, ApiError> {
    Ok(SessionInfo {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        message_count: row.try_get("msg_count")?,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, ApiError> {
    let id: i64 = row.try_get("id")?;
    let role: String = row.try_get("role")?;
    let attachments: String = row.try_get("attachments")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    let attachments = serde_json::from_str(&attachments).unwrap_or_else(|e| {
        tracing::warn!("Message {} has unreadable attachments, dropping them: {}", id, e);
        Vec::new()
    });
    let metadata = metadata.and_then(|m| match serde_json::from_str(&m) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Message {} has unreadable metadata, dropping it: {}", id, e);
            None
        }
    });

    Ok(Message {
        id,
        session_id: row.try_get("session_id")?,
        role: Role::parse(&role)
            .ok_or_else(|| ApiError::Internal(format!("Unknown message role '{}'", role)))?,
        content: row.try_get("content")?,
        attachments,
        metadata,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db;
    use serde_json::json;

    async fn test_store() -> HistoryStore {
        let tmp = std::env::temp_dir().join(format!(
            "lexchat-history-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let pool = db::connect(&format!("sqlite://{}", tmp.display()))
            .await
            .unwrap();
        HistoryStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn append_then_load_preserves_order_and_attachments() {
        let store = test_store().await;
        let session = store.create_session(Some("u1"), "Deposit question").await.unwrap();

        let attachment = AttachmentMeta {
            kind: "document".to_string(),
            format: "pdf".to_string(),
            filename: Some("lease.pdf".to_string()),
            excerpt: "The tenant shall pay".to_string(),
            word_count: 4,
        };
        store
            .append(
                &session,
                NewMessage::new(Role::User, "Is this clause fair?")
                    .with_attachments(vec![attachment.clone()])
                    .with_metadata(json!({ "prompt": "Document content:\nThe tenant shall pay\n\nUser question: Is this clause fair?" })),
            )
            .await
            .unwrap();
        store
            .append(&session, NewMessage::new(Role::Assistant, "Mostly."))
            .await
            .unwrap();

        let messages = store.load(&session).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].attachments, vec![attachment]);
        assert!(messages[0].model_text().starts_with("Document content:"));
        assert_eq!(messages[1].model_text(), "Mostly.");

        let info = store.get_session(&session).await.unwrap().unwrap();
        assert_eq!(info.message_count, 2);
        assert_eq!(info.title, "Deposit question");
    }

    #[tokio::test]
    async fn clear_then_load_returns_empty() {
        let store = test_store().await;
        store
            .append("s1", NewMessage::new(Role::User, "hello"))
            .await
            .unwrap();

        assert_eq!(store.clear("s1").await.unwrap(), 1);
        assert!(store.load("s1").await.unwrap().is_empty());
        assert!(store.get_session("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn load_recent_returns_tail_in_order() {
        let store = test_store().await;
        for i in 0..5 {
            store
                .append("s1", NewMessage::new(Role::User, format!("m{}", i)))
                .await
                .unwrap();
        }

        let recent = store.load_recent("s1", 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn sessions_are_scoped_to_their_owner() {
        let store = test_store().await;
        let mine = store.create_session(Some("alice"), "Mine").await.unwrap();
        let theirs = store.create_session(Some("bob"), "Theirs").await.unwrap();
        store
            .append(&mine, NewMessage::new(Role::User, "a"))
            .await
            .unwrap();
        store
            .append(&theirs, NewMessage::new(Role::User, "b"))
            .await
            .unwrap();

        assert!(store.find_owned_session("alice", &mine).await.unwrap().is_some());
        assert!(store.find_owned_session("alice", &theirs).await.unwrap().is_none());

        let listed = store.list_sessions("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine);

        assert_eq!(store.clear_user("alice").await.unwrap(), 1);
        assert!(store.load(&mine).await.unwrap().is_empty());
        assert_eq!(store.load(&theirs).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_turn_stores_question_and_answer_together() {
        let store = test_store().await;
        let session = store.create_session(Some("u1"), "Notice").await.unwrap();

        let stored = store
            .append_turn(
                &session,
                vec![
                    NewMessage::new(Role::User, "How much notice?"),
                    NewMessage::new(Role::Assistant, "Thirty days."),
                ],
            )
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert!(stored[0].id < stored[1].id);
        let roles: Vec<_> = store
            .load(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn corrupt_json_columns_load_as_defaults() {
        let store = test_store().await;
        store
            .append("s1", NewMessage::new(Role::User, "hello"))
            .await
            .unwrap();
        sqlx::query("UPDATE messages SET attachments = '{not json', metadata = 'nope' WHERE session_id = 's1'")
            .execute(&store.pool)
            .await
            .unwrap();

        let messages = store.load("s1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].attachments.is_empty());
        assert!(messages[0].metadata.is_none());
        assert_eq!(messages[0].model_text(), "hello");
    }
}
