//! Skills group related tool definitions and carry the trigger keywords
//! the selector matches incoming messages against. The catalog is a static
//! declaration list; the registry built from it rejects duplicate tool
//! names at startup.

use serde_json::Value;

use crate::models::ConfirmationOption;

mod catalog;
mod selector;

pub use catalog::{GENERAL_SKILL, builtin_catalog};
pub use selector::select_skills;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBackend {
    /// Deterministic in-process execution, no retry.
    Utility,
    /// Secondary call to the hosted model with a task-specific prompt.
    ModelSkill,
    /// Invocation through the data-platform tool protocol.
    BackendRpc,
}

impl ToolBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utility => "utility",
            Self::ModelSkill => "model_skill",
            Self::BackendRpc => "backend_rpc",
        }
    }
}

/// Credit price of one invocation, derived from the validated arguments.
pub type CreditCostFn = fn(&Value) -> i64;

/// Builds the option list presented at a confirmation gate.
pub type ConfirmationOptionsFn = fn(&Value) -> Vec<ConfirmationOption>;

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub backend: ToolBackend,
    pub requires_confirmation: bool,
    pub credit_cost: Option<CreditCostFn>,
    confirmation_options: Option<ConfirmationOptionsFn>,
}

impl ToolDefinition {
    pub fn new(
        name: &'static str,
        description: &'static str,
        input_schema: Value,
        backend: ToolBackend,
    ) -> Self {
        Self {
            name,
            description,
            input_schema,
            backend,
            requires_confirmation: false,
            credit_cost: None,
            confirmation_options: None,
        }
    }

    pub fn with_confirmation(mut self, options: Option<ConfirmationOptionsFn>) -> Self {
        self.requires_confirmation = true;
        self.confirmation_options = options;
        self
    }

    pub fn with_credit_cost(mut self, cost: CreditCostFn) -> Self {
        self.credit_cost = Some(cost);
        self
    }

    /// Options offered to the human at the confirmation gate. The chosen
    /// option's payload becomes the arguments the tool executes with; the
    /// implicit cancel option is added by the broker, not declared here.
    pub fn confirmation_options(&self, arguments: &Value) -> Vec<ConfirmationOption> {
        match self.confirmation_options {
            Some(build) => build(arguments),
            None => vec![ConfirmationOption {
                label: "Proceed".to_string(),
                payload: arguments.clone(),
            }],
        }
    }

    pub fn credit_cost_for(&self, arguments: &Value) -> Option<i64> {
        self.credit_cost.map(|cost| cost(arguments))
    }
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub name: &'static str,
    pub description: &'static str,
    /// Lowercase keywords/phrases; multi-word triggers match as substrings,
    /// single words match whole tokens.
    pub triggers: &'static [&'static str],
    pub tools: Vec<ToolDefinition>,
}
