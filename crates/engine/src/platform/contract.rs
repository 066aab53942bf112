use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PLATFORM_RPC_CONTRACT_VERSION: &str = "v1";
pub const PLATFORM_RPC_PATH_CALL_TOOL: &str = "/v1/rpc/tools/call";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformToolCallRequest {
    pub contract_version: String,
    pub request_id: String,
    pub tool: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformToolCallResponse {
    pub contract_version: String,
    pub request_id: String,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformErrorEnvelope {
    pub contract_version: String,
    pub request_id: Option<String>,
    pub error: PlatformErrorPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformErrorPayload {
    pub code: String,
    pub message: String,
}

/// Fixed error vocabulary of the tool-invocation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorCode {
    ConnectionFailure,
    Timeout,
    ToolNotFound,
    InvalidParams,
    ExecutionFailed,
    InsufficientResource,
}

impl PlatformErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailure => "connection_failure",
            Self::Timeout => "timeout",
            Self::ToolNotFound => "tool_not_found",
            Self::InvalidParams => "invalid_params",
            Self::ExecutionFailed => "execution_failed",
            Self::InsufficientResource => "insufficient_resource",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "connection_failure" => Some(Self::ConnectionFailure),
            "timeout" => Some(Self::Timeout),
            "tool_not_found" => Some(Self::ToolNotFound),
            "invalid_params" => Some(Self::InvalidParams),
            "execution_failed" => Some(Self::ExecutionFailed),
            "insufficient_resource" => Some(Self::InsufficientResource),
            _ => None,
        }
    }

    /// Connection failures, timeouts, and execution failures are worth
    /// retrying; the rest will fail the same way every time.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConnectionFailure | Self::Timeout | Self::ExecutionFailed
        )
    }
}
