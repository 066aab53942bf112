//! Typed turn events and the per-session broadcast registry the SSE
//! endpoint subscribes to.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ConfirmationOption, ErrorBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StreamEvent {
    /// Incremental assistant text. The persisted assistant message is the
    /// concatenation of every delta emitted during the turn.
    Content { delta: String },
    /// Structured payload for client-side rendering (charts, cards).
    Metadata { payload: Value },
    ConfirmationRequest {
        tool_call_id: Uuid,
        options: Vec<ConfirmationOption>,
    },
    /// Terminal event; exactly one per turn.
    Done {
        status: TurnStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
}

impl StreamEvent {
    /// SSE event name for this payload.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Metadata { .. } => "metadata",
            Self::ConfirmationRequest { .. } => "confirmation_request",
            Self::Done { .. } => "done",
        }
    }
}

/// One broadcast channel per session, created at intake time so a caller
/// who opens the stream alongside intake sees the whole turn. Publishing
/// with no subscriber drops the event; the transport does not buffer
/// across connections.
pub struct TurnStreams {
    capacity: usize,
    channels: Mutex<HashMap<Uuid, broadcast::Sender<StreamEvent>>>,
}

impl TurnStreams {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn publisher(&self, session_id: Uuid) -> broadcast::Sender<StreamEvent> {
        let mut channels = self.lock_channels();
        channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<StreamEvent> {
        self.publisher(session_id).subscribe()
    }

    pub fn publish(&self, session_id: Uuid, event: StreamEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.publisher(session_id).send(event);
    }

    fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, broadcast::Sender<StreamEvent>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
