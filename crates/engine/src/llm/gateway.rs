use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::Attachment;

pub type ModelGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModelCompletion, ModelGatewayError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    User,
    Assistant,
    Tool,
}

impl ModelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One entry of the conversation as presented to the model. Attachment
/// references travel through untouched; the core never loads their bytes.
#[derive(Debug, Clone)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: String,
    /// Set on tool-result messages: provider-side id of the call answered.
    pub tool_call_id: Option<String>,
    /// Set on assistant messages that requested tool calls.
    pub tool_calls: Vec<ToolCallRequest>,
    pub attachments: Vec<Attachment>,
}

impl ModelMessage {
    pub fn text(role: ModelRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// Tool definition subset exposed to the model: name, description, and the
/// JSON schema of the arguments.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolSpec>,
}

/// A tool invocation the model asked for during planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ModelCompletion {
    pub model: String,
    pub provider_request_id: Option<String>,
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<ModelTokenUsage>,
}

#[derive(Debug, Error)]
pub enum ModelGatewayError {
    #[error("model provider request timed out")]
    Timeout,
    #[error("model provider request failed: {0}")]
    ProviderFailure(String),
    #[error("model provider returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

/// Abstraction over the hosted model service: the core depends only on
/// this shape, never on a concrete provider API.
pub trait ChatModelGateway: Send + Sync {
    fn generate<'a>(&'a self, request: ModelRequest) -> ModelGatewayFuture<'a>;
}
