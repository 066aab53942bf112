//! Session persistence: message history plus the turn checkpoint that
//! keeps a pending confirmation re-offerable across process restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ConfirmationOption, Message, Session};

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

/// Persisted record of a turn suspended at a confirmation gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnCheckpoint {
    pub session_id: Uuid,
    pub tool_call_id: Uuid,
    pub tool_name: String,
    pub arguments: Value,
    pub options: Vec<ConfirmationOption>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session, creating it when the id is unknown or absent.
    /// Sessions come into being on first message; the core never deletes
    /// them.
    async fn find_or_create_session(
        &self,
        session_id: Option<Uuid>,
        user_id: Uuid,
        metadata: Value,
    ) -> Result<Session, StoreError>;

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Full history in creation order.
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// Append a turn's messages atomically: either every message of the
    /// turn becomes visible or none does.
    async fn append_messages(
        &self,
        session_id: Uuid,
        messages: &[Message],
    ) -> Result<(), StoreError>;

    async fn save_checkpoint(&self, checkpoint: &TurnCheckpoint) -> Result<(), StoreError>;

    async fn clear_checkpoint(
        &self,
        session_id: Uuid,
        tool_call_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn pending_checkpoint(
        &self,
        session_id: Uuid,
    ) -> Result<Option<TurnCheckpoint>, StoreError>;

    /// Cheap liveness probe for readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;
}
