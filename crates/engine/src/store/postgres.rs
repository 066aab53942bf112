use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Message, MessageRole, Session};

use super::{SessionStore, StoreError, TurnCheckpoint};

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_or_create_session(
        &self,
        session_id: Option<Uuid>,
        user_id: Uuid,
        metadata: Value,
    ) -> Result<Session, StoreError> {
        let id = session_id.unwrap_or_else(Uuid::new_v4);
        let row = sqlx::query(
            "INSERT INTO sessions (id, user_id, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, NOW(), NOW())
             ON CONFLICT (id) DO UPDATE SET updated_at = sessions.updated_at
             RETURNING id, user_id, metadata, created_at, updated_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(&metadata)
        .fetch_one(&self.pool)
        .await?;

        session_from_row(&row)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, metadata, created_at, updated_at
             FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| session_from_row(&row)).transpose()
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, role, content, attachments, tool_calls, tool_call_id, created_at
             FROM messages
             WHERE session_id = $1
             ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn append_messages(
        &self,
        session_id: Uuid,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for message in messages {
            let attachments = serde_json::to_value(&message.attachments)
                .map_err(|err| StoreError::InvalidData(err.to_string()))?;
            let tool_calls = serde_json::to_value(&message.tool_calls)
                .map_err(|err| StoreError::InvalidData(err.to_string()))?;
            sqlx::query(
                "INSERT INTO messages
                 (id, session_id, role, content, attachments, tool_calls, tool_call_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(message.id)
            .bind(session_id)
            .bind(role_to_db(message.role))
            .bind(&message.content)
            .bind(attachments)
            .bind(tool_calls)
            .bind(message.tool_call_id)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE sessions SET updated_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &TurnCheckpoint) -> Result<(), StoreError> {
        let options = serde_json::to_value(&checkpoint.options)
            .map_err(|err| StoreError::InvalidData(err.to_string()))?;
        sqlx::query(
            "INSERT INTO turn_checkpoints
             (session_id, tool_call_id, tool_name, arguments, options, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (session_id) DO UPDATE SET
               tool_call_id = EXCLUDED.tool_call_id,
               tool_name = EXCLUDED.tool_name,
               arguments = EXCLUDED.arguments,
               options = EXCLUDED.options,
               created_at = EXCLUDED.created_at",
        )
        .bind(checkpoint.session_id)
        .bind(checkpoint.tool_call_id)
        .bind(&checkpoint.tool_name)
        .bind(&checkpoint.arguments)
        .bind(options)
        .bind(checkpoint.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_checkpoint(
        &self,
        session_id: Uuid,
        tool_call_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM turn_checkpoints WHERE session_id = $1 AND tool_call_id = $2",
        )
        .bind(session_id)
        .bind(tool_call_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_checkpoint(
        &self,
        session_id: Uuid,
    ) -> Result<Option<TurnCheckpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT session_id, tool_call_id, tool_name, arguments, options, created_at
             FROM turn_checkpoints
             WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let options_raw: Value = row.try_get("options")?;
            let options = serde_json::from_value(options_raw)
                .map_err(|err| StoreError::InvalidData(format!("checkpoint options: {err}")))?;
            Ok(TurnCheckpoint {
                session_id: row.try_get("session_id")?,
                tool_call_id: row.try_get("tool_call_id")?,
                tool_name: row.try_get("tool_name")?,
                arguments: row.try_get("arguments")?,
                options,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1 AS one").fetch_one(&self.pool).await?;
        Ok(())
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<Session, StoreError> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &sqlx::postgres::PgRow) -> Result<Message, StoreError> {
    let role_raw: String = row.try_get("role")?;
    let role = role_from_db(&role_raw)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown message role: {role_raw}")))?;
    let attachments_raw: Value = row.try_get("attachments")?;
    let attachments = serde_json::from_value(attachments_raw)
        .map_err(|err| StoreError::InvalidData(format!("message attachments: {err}")))?;
    let tool_calls_raw: Value = row.try_get("tool_calls")?;
    let tool_calls = serde_json::from_value(tool_calls_raw)
        .map_err(|err| StoreError::InvalidData(format!("message tool calls: {err}")))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Message {
        id: row.try_get("id")?,
        role,
        content: row.try_get("content")?,
        attachments,
        tool_calls,
        tool_call_id: row.try_get("tool_call_id")?,
        created_at,
    })
}

fn role_to_db(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn role_from_db(value: &str) -> Option<MessageRole> {
    match value {
        "user" => Some(MessageRole::User),
        "assistant" => Some(MessageRole::Assistant),
        "tool" => Some(MessageRole::Tool),
        _ => None,
    }
}
