//! Tool execution. The dispatcher switches on the declared backend tag:
//! utilities run in-process with no retry, model-backed skills and
//! platform RPCs are upstream dependencies with a transient-retry policy
//! and, when priced, a reserve/commit/refund ledger bracket.

use std::sync::Arc;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::ledger::{CreditLedger, LedgerError};
use crate::llm::{ChatModelGateway, ModelGatewayError, ModelMessage, ModelRequest, ModelRole};
use crate::models::{ToolCall, ToolCallStatus, ToolFailure};
use crate::platform::DataPlatform;
use crate::registry::ToolRegistry;
use crate::skills::{ToolBackend, ToolDefinition};
use crate::tools::{prompts, utility};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Ledger infrastructure failure mid-bracket. Unlike an insufficient
    /// balance (which just fails the call), this aborts the whole turn:
    /// the reservation invariant can no longer be guaranteed.
    #[error("ledger failure during dispatch: {0}")]
    Ledger(LedgerError),
}

#[derive(Clone)]
pub struct ToolDispatcher {
    config: EngineConfig,
    registry: Arc<ToolRegistry>,
    ledger: Arc<dyn CreditLedger>,
    model: Arc<dyn ChatModelGateway>,
    platform: Arc<dyn DataPlatform>,
}

impl ToolDispatcher {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ToolRegistry>,
        ledger: Arc<dyn CreditLedger>,
        model: Arc<dyn ChatModelGateway>,
        platform: Arc<dyn DataPlatform>,
    ) -> Self {
        Self {
            config,
            registry,
            ledger,
            model,
            platform,
        }
    }

    /// Run one tool call to a terminal status. Component-local failures
    /// land in the returned call's `error`; only a ledger infrastructure
    /// failure escapes as `Err`.
    pub async fn dispatch(
        &self,
        mut call: ToolCall,
        user_id: Uuid,
    ) -> Result<ToolCall, DispatchError> {
        let Some(definition) = self.registry.get(&call.name) else {
            let message = format!("no tool named {} is registered", call.name);
            fail(
                &mut call,
                ToolFailure::new("tool_not_found", message, false),
            );
            return Ok(call);
        };

        // Rejected input must have no side effects, so validation runs
        // before any reservation or upstream call.
        if let Err(failure) = validate_arguments(definition, &call.arguments) {
            fail(&mut call, failure);
            return Ok(call);
        }

        let mut reserved = false;
        if let Some(cost) = definition.credit_cost_for(&call.arguments) {
            match self.ledger.reserve(user_id, cost, call.id).await {
                Ok(()) => reserved = true,
                Err(LedgerError::InsufficientBalance {
                    requested,
                    available,
                    shortfall,
                }) => {
                    fail(
                        &mut call,
                        ToolFailure::new(
                            "insufficient_credits",
                            format!(
                                "{} needs {requested} credits but only {available} are available \
                                 (short {shortfall})",
                                definition.name
                            ),
                            false,
                        ),
                    );
                    return Ok(call);
                }
                Err(other) => return Err(DispatchError::Ledger(other)),
            }
        }

        call.status = ToolCallStatus::Running;
        let outcome = self.execute_with_retry(definition, &mut call).await;

        match outcome {
            Ok(result) => {
                call.status = ToolCallStatus::Succeeded;
                call.result = Some(result);
                if reserved {
                    self.ledger
                        .commit(call.id)
                        .await
                        .map_err(DispatchError::Ledger)?;
                }
            }
            Err(failure) => {
                debug!(
                    tool = definition.name,
                    code = failure.code.as_str(),
                    retries = call.retries,
                    "tool call failed"
                );
                fail(&mut call, failure);
                if reserved {
                    self.ledger
                        .refund(call.id)
                        .await
                        .map_err(DispatchError::Ledger)?;
                }
            }
        }

        Ok(call)
    }

    async fn execute_with_retry(
        &self,
        definition: &ToolDefinition,
        call: &mut ToolCall,
    ) -> Result<Value, ToolFailure> {
        if definition.backend == ToolBackend::Utility {
            return utility::execute_utility(definition.name, &call.arguments, &self.config);
        }

        let mut attempt = 0_u32;
        loop {
            let result = match definition.backend {
                ToolBackend::ModelSkill => {
                    self.call_model_skill(definition, &call.arguments).await
                }
                ToolBackend::BackendRpc => self.call_platform(definition, &call.arguments).await,
                ToolBackend::Utility => unreachable!("handled above"),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(failure)
                    if failure.retryable && attempt < self.config.dispatch_max_retries =>
                {
                    let delay_ms = backoff_delay_ms(
                        self.config.dispatch_backoff_base_ms,
                        self.config.dispatch_backoff_max_ms,
                        attempt,
                    );
                    debug!(
                        tool = definition.name,
                        attempt,
                        delay_ms,
                        code = failure.code.as_str(),
                        "transient tool failure, backing off"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                    call.retries = attempt;
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    async fn call_model_skill(
        &self,
        definition: &ToolDefinition,
        arguments: &Value,
    ) -> Result<Value, ToolFailure> {
        let template = prompts::template_for_model_skill(definition.name).ok_or_else(|| {
            ToolFailure::new(
                "missing_prompt_template",
                format!("{} has no task prompt registered", definition.name),
                false,
            )
        })?;

        let task_input = serde_json::to_string_pretty(arguments)
            .unwrap_or_else(|_| arguments.to_string());
        let request = ModelRequest {
            system_prompt: template.system_prompt.to_string(),
            messages: vec![ModelMessage::text(
                ModelRole::User,
                format!("{}\n\nTask input:\n{task_input}", template.task_prompt),
            )],
            tools: Vec::new(),
        };

        match self.model.generate(request).await {
            Ok(completion) => Ok(json!({
                "content": completion.text,
                "model": completion.model,
            })),
            Err(err) => Err(model_failure(err)),
        }
    }

    async fn call_platform(
        &self,
        definition: &ToolDefinition,
        arguments: &Value,
    ) -> Result<Value, ToolFailure> {
        self.platform
            .call_tool(definition.name, arguments.clone())
            .await
            .map_err(|err| ToolFailure::new(err.error_code(), err.to_string(), err.is_retryable()))
    }
}

fn fail(call: &mut ToolCall, failure: ToolFailure) {
    call.status = ToolCallStatus::Failed;
    call.error = Some(failure);
}

fn model_failure(err: ModelGatewayError) -> ToolFailure {
    match err {
        ModelGatewayError::Timeout => {
            ToolFailure::new("model_timeout", "model skill call timed out", true)
        }
        ModelGatewayError::ProviderFailure(message) => {
            ToolFailure::new("model_provider_failure", message, true)
        }
        ModelGatewayError::InvalidProviderPayload(message) => {
            ToolFailure::new("invalid_model_payload", message, false)
        }
    }
}

fn validate_arguments(definition: &ToolDefinition, arguments: &Value) -> Result<(), ToolFailure> {
    let validator = JSONSchema::compile(&definition.input_schema).map_err(|err| {
        ToolFailure::new(
            "schema_compile_failed",
            format!("input schema for {} failed to compile: {err}", definition.name),
            false,
        )
    })?;

    if let Err(validation_errors) = validator.validate(arguments) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ToolFailure::new(
            "invalid_params",
            format!("arguments for {} rejected: {errors}", definition.name),
            false,
        ));
    }

    Ok(())
}

/// Exponential backoff: base * 2^attempt, capped. Attempt 0 waits the base
/// delay.
pub(crate) fn backoff_delay_ms(base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    let capped_exponent = attempt.min(20);
    let multiplier = 1_u64 << capped_exponent;
    base_ms.saturating_mul(multiplier).min(max_ms)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::skills::builtin_catalog;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay_ms(250, 10_000, 0), 250);
        assert_eq!(backoff_delay_ms(250, 10_000, 1), 500);
        assert_eq!(backoff_delay_ms(250, 10_000, 2), 1_000);
        assert_eq!(backoff_delay_ms(250, 10_000, 10), 10_000);
        assert_eq!(backoff_delay_ms(250, 10_000, 63), 10_000);
    }

    #[test]
    fn argument_validation_rejects_schema_violations() {
        let registry = ToolRegistry::build(builtin_catalog()).unwrap();
        let definition = registry.get("update_campaign_budget").unwrap();

        assert!(
            validate_arguments(
                definition,
                &json!({ "campaign_id": "c-1", "daily_budget": 25.0 })
            )
            .is_ok()
        );

        let missing_field = validate_arguments(definition, &json!({ "campaign_id": "c-1" }))
            .unwrap_err();
        assert_eq!(missing_field.code, "invalid_params");
        assert!(!missing_field.retryable);

        let wrong_type = validate_arguments(
            definition,
            &json!({ "campaign_id": "c-1", "daily_budget": "lots" }),
        )
        .unwrap_err();
        assert_eq!(wrong_type.code, "invalid_params");
    }
}
