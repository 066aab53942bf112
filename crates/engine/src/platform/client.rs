use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::contract::{
    PLATFORM_RPC_CONTRACT_VERSION, PLATFORM_RPC_PATH_CALL_TOOL, PlatformErrorCode,
    PlatformErrorEnvelope, PlatformToolCallRequest, PlatformToolCallResponse,
};
use super::{DataPlatform, PlatformRpcError};

#[derive(Clone)]
pub struct PlatformRpcClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl PlatformRpcClient {
    pub fn new(base_url: String, http_client: reqwest::Client) -> Self {
        Self {
            base_url,
            http_client,
        }
    }

    fn call_tool_url(&self) -> String {
        format!(
            "{}{PLATFORM_RPC_PATH_CALL_TOOL}",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl DataPlatform for PlatformRpcClient {
    async fn call_tool(&self, tool: &str, params: Value) -> Result<Value, PlatformRpcError> {
        let payload = PlatformToolCallRequest {
            contract_version: PLATFORM_RPC_CONTRACT_VERSION.to_string(),
            request_id: Uuid::new_v4().to_string(),
            tool: tool.to_string(),
            params,
        };

        let response = self
            .http_client
            .post(self.call_tool_url())
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PlatformRpcError::Tool {
                        code: PlatformErrorCode::Timeout,
                        message: "platform rpc request timed out".to_string(),
                    }
                } else {
                    PlatformRpcError::Tool {
                        code: PlatformErrorCode::ConnectionFailure,
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| PlatformRpcError::TransportUnavailable {
                message: format!("failed to read platform rpc response body: {err}"),
            })?;

        if !status.is_success() {
            let envelope: PlatformErrorEnvelope =
                serde_json::from_str(&body).map_err(|_| PlatformRpcError::ResponseInvalid {
                    message: format!("undecodable error envelope, status={}", status.as_u16()),
                })?;
            let code = PlatformErrorCode::from_code(&envelope.error.code).ok_or_else(|| {
                PlatformRpcError::ResponseInvalid {
                    message: format!("unknown platform error code: {}", envelope.error.code),
                }
            })?;
            return Err(PlatformRpcError::Tool {
                code,
                message: envelope.error.message,
            });
        }

        let parsed: PlatformToolCallResponse =
            serde_json::from_str(&body).map_err(|err| PlatformRpcError::ResponseInvalid {
                message: format!("undecodable tool call response: {err}"),
            })?;

        if parsed.request_id != payload.request_id {
            return Err(PlatformRpcError::ResponseInvalid {
                message: "platform rpc response request_id mismatch".to_string(),
            });
        }

        Ok(parsed.result)
    }
}
