use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Message, Session};

use super::{SessionStore, StoreError, TurnCheckpoint};

#[derive(Default)]
struct SessionRecord {
    session: Option<Session>,
    messages: Vec<Message>,
    checkpoint: Option<TurnCheckpoint>,
}

/// In-process store for tests and single-node development setups.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SessionRecord>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_or_create_session(
        &self,
        session_id: Option<Uuid>,
        user_id: Uuid,
        metadata: Value,
    ) -> Result<Session, StoreError> {
        let id = session_id.unwrap_or_else(Uuid::new_v4);
        let mut sessions = self.lock_sessions();
        let record = sessions.entry(id).or_default();
        if let Some(session) = &record.session {
            return Ok(session.clone());
        }

        let now = Utc::now();
        let session = Session {
            id,
            user_id,
            metadata,
            created_at: now,
            updated_at: now,
        };
        record.session = Some(session.clone());
        Ok(session)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock_sessions()
            .get(&session_id)
            .and_then(|record| record.session.clone()))
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .lock_sessions()
            .get(&session_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default())
    }

    async fn append_messages(
        &self,
        session_id: Uuid,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let mut sessions = self.lock_sessions();
        let record = sessions.entry(session_id).or_default();
        record.messages.extend_from_slice(messages);
        if let Some(session) = &mut record.session {
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &TurnCheckpoint) -> Result<(), StoreError> {
        let mut sessions = self.lock_sessions();
        let record = sessions.entry(checkpoint.session_id).or_default();
        record.checkpoint = Some(checkpoint.clone());
        Ok(())
    }

    async fn clear_checkpoint(
        &self,
        session_id: Uuid,
        tool_call_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut sessions = self.lock_sessions();
        if let Some(record) = sessions.get_mut(&session_id)
            && record
                .checkpoint
                .as_ref()
                .is_some_and(|cp| cp.tool_call_id == tool_call_id)
        {
            record.checkpoint = None;
        }
        Ok(())
    }

    async fn pending_checkpoint(
        &self,
        session_id: Uuid,
    ) -> Result<Option<TurnCheckpoint>, StoreError> {
        Ok(self
            .lock_sessions()
            .get(&session_id)
            .and_then(|record| record.checkpoint.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
