use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            _ => None,
        }
    }
}

/// Opaque reference to an uploaded asset. The core never reads the bytes;
/// the storage path travels through to the model gateway untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub storage_path: String,
    pub kind: AttachmentKind,
    pub size_bytes: u64,
}

/// Summary of a tool invocation recorded on the assistant message that
/// requested it. The live [`ToolCall`] state machine is turn-scoped and
/// discarded once the turn persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: Uuid,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Set on `tool` messages: the id of the [`ToolCallRecord`] this result
    /// answers. Always references a call from an earlier message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: String, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            content,
            attachments,
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: String, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::Assistant,
            content,
            attachments: Vec::new(),
            tool_calls,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn tool_result(tool_call_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::Tool,
            content,
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Single extension point for collaborator-owned annotations. The core
    /// writes nothing here beyond what intake supplies.
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    AwaitingConfirmation,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFailure {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ToolFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn cancelled() -> Self {
        Self::new("cancelled", "The operation was cancelled before execution", false)
    }
}

/// Live state of one requested tool invocation within the current turn.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: Uuid,
    pub name: String,
    pub arguments: Value,
    pub status: ToolCallStatus,
    pub result: Option<Value>,
    pub error: Option<ToolFailure>,
    pub retries: u32,
}

impl ToolCall {
    pub fn requested(name: String, arguments: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
            retries: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ToolCallStatus::Succeeded | ToolCallStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationOption {
    pub label: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub tool_call_id: Uuid,
    pub options: Vec<ConfirmationOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConfirmChoice {
    /// Index into the presented option list.
    Option { index: usize },
    Cancel,
}

// --- HTTP wire types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub user_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAccepted {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmRequest {
    pub session_id: Uuid,
    pub tool_call_id: Uuid,
    pub choice: ConfirmChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmResolution {
    Resolved,
    AlreadyResolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmAccepted {
    pub status: ConfirmResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAccepted {
    /// False when no turn was in flight for the session.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
