//! Consumed tool-invocation protocol of the backend data platform.
//!
//! The core calls `call_tool(name, params)` and receives either a result
//! value or a typed error envelope with a fixed error-code vocabulary.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod client;
mod contract;

pub use client::PlatformRpcClient;
pub use contract::{
    PLATFORM_RPC_CONTRACT_VERSION, PLATFORM_RPC_PATH_CALL_TOOL, PlatformErrorCode,
    PlatformErrorEnvelope, PlatformErrorPayload, PlatformToolCallRequest,
    PlatformToolCallResponse,
};

#[derive(Debug, Error)]
pub enum PlatformRpcError {
    #[error("platform tool call failed: code={} {message}", code.as_str())]
    Tool {
        code: PlatformErrorCode,
        message: String,
    },
    #[error("platform rpc transport unavailable: {message}")]
    TransportUnavailable { message: String },
    #[error("platform rpc response invalid: {message}")]
    ResponseInvalid { message: String },
}

impl PlatformRpcError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Tool { code, .. } => code.is_retryable(),
            Self::TransportUnavailable { .. } => true,
            Self::ResponseInvalid { .. } => false,
        }
    }

    /// Stable code surfaced in tool-failure payloads.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Tool { code, .. } => code.as_str(),
            Self::TransportUnavailable { .. } => "connection_failure",
            Self::ResponseInvalid { .. } => "invalid_platform_response",
        }
    }
}

#[async_trait]
pub trait DataPlatform: Send + Sync {
    async fn call_tool(&self, tool: &str, params: Value) -> Result<Value, PlatformRpcError>;
}
