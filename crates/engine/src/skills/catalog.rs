use serde_json::{Value, json};

use crate::models::ConfirmationOption;

use super::{Skill, ToolBackend, ToolDefinition};

pub const GENERAL_SKILL: &str = "general";

/// The static skill catalog. Declaration order here is the tie-break order
/// used by the selector and the tool-list order exposed to the model.
pub fn builtin_catalog() -> Vec<Skill> {
    vec![
        Skill {
            name: "creative",
            description: "Ad copy and headline generation",
            triggers: &[
                "ad copy",
                "copy",
                "creative",
                "headline",
                "headlines",
                "write",
                "slogan",
            ],
            tools: vec![
                ToolDefinition::new(
                    "generate_ad_copy",
                    "Generate ad copy variants for a product or offer",
                    json!({
                        "type": "object",
                        "properties": {
                            "product": { "type": "string" },
                            "tone": { "type": "string" },
                            "variant_count": { "type": "integer", "minimum": 1, "maximum": 10 }
                        },
                        "required": ["product"],
                        "additionalProperties": false
                    }),
                    ToolBackend::ModelSkill,
                )
                .with_credit_cost(ad_copy_cost),
                ToolDefinition::new(
                    "suggest_headlines",
                    "Suggest short campaign headlines for a product",
                    json!({
                        "type": "object",
                        "properties": {
                            "product": { "type": "string" },
                            "count": { "type": "integer", "minimum": 1, "maximum": 20 }
                        },
                        "required": ["product"],
                        "additionalProperties": false
                    }),
                    ToolBackend::ModelSkill,
                )
                .with_credit_cost(|_| 3),
            ],
        },
        Skill {
            name: "analytics",
            description: "Campaign performance analysis and A/B evaluation",
            triggers: &[
                "performance",
                "metrics",
                "ctr",
                "conversion",
                "conversions",
                "a/b",
                "ab test",
                "significance",
                "analyze",
                "report",
            ],
            tools: vec![
                ToolDefinition::new(
                    "fetch_campaign_metrics",
                    "Fetch performance metrics for a campaign from the data platform",
                    json!({
                        "type": "object",
                        "properties": {
                            "campaign_id": { "type": "string" },
                            "date_range": {
                                "type": "object",
                                "properties": {
                                    "from": { "type": "string" },
                                    "to": { "type": "string" }
                                },
                                "required": ["from", "to"],
                                "additionalProperties": false
                            }
                        },
                        "required": ["campaign_id"],
                        "additionalProperties": false
                    }),
                    ToolBackend::BackendRpc,
                ),
                ToolDefinition::new(
                    "analyze_ab_test",
                    "Run a two-variant significance test on experiment results",
                    json!({
                        "type": "object",
                        "properties": {
                            "variant_a": variant_schema(),
                            "variant_b": variant_schema()
                        },
                        "required": ["variant_a", "variant_b"],
                        "additionalProperties": false
                    }),
                    ToolBackend::Utility,
                ),
                ToolDefinition::new(
                    "summarize_performance",
                    "Write a narrative summary of supplied campaign metrics",
                    json!({
                        "type": "object",
                        "properties": {
                            "metrics": { "type": "object" },
                            "period": { "type": "string" }
                        },
                        "required": ["metrics"],
                        "additionalProperties": false
                    }),
                    ToolBackend::ModelSkill,
                )
                .with_credit_cost(|_| 2),
            ],
        },
        Skill {
            name: "campaign",
            description: "Campaign state and budget management",
            triggers: &[
                "campaign",
                "campaigns",
                "budget",
                "pause",
                "resume",
                "activate",
                "archive",
            ],
            tools: vec![
                ToolDefinition::new(
                    "list_campaigns",
                    "List the user's campaigns, optionally filtered by status",
                    json!({
                        "type": "object",
                        "properties": {
                            "status": { "type": "string", "enum": ["active", "paused", "archived"] }
                        },
                        "additionalProperties": false
                    }),
                    ToolBackend::BackendRpc,
                ),
                ToolDefinition::new(
                    "update_campaign_budget",
                    "Change a campaign's daily budget",
                    json!({
                        "type": "object",
                        "properties": {
                            "campaign_id": { "type": "string" },
                            "daily_budget": { "type": "number", "exclusiveMinimum": 0 },
                            "effective_at": {
                                "type": "string",
                                "enum": ["immediately", "next_midnight"]
                            }
                        },
                        "required": ["campaign_id", "daily_budget"],
                        "additionalProperties": false
                    }),
                    ToolBackend::BackendRpc,
                )
                .with_confirmation(Some(budget_confirmation_options)),
                ToolDefinition::new(
                    "set_campaign_status",
                    "Activate, pause, or archive a campaign",
                    json!({
                        "type": "object",
                        "properties": {
                            "campaign_id": { "type": "string" },
                            "status": { "type": "string", "enum": ["active", "paused", "archived"] }
                        },
                        "required": ["campaign_id", "status"],
                        "additionalProperties": false
                    }),
                    ToolBackend::BackendRpc,
                )
                .with_confirmation(None),
            ],
        },
        Skill {
            name: "landing_pages",
            description: "Landing-page generation and tracked links",
            triggers: &["landing", "landing page", "utm", "tracked link"],
            tools: vec![
                ToolDefinition::new(
                    "generate_landing_page",
                    "Generate landing-page copy and structure for an offer",
                    json!({
                        "type": "object",
                        "properties": {
                            "product": { "type": "string" },
                            "campaign_id": { "type": "string" },
                            "style": { "type": "string" }
                        },
                        "required": ["product"],
                        "additionalProperties": false
                    }),
                    ToolBackend::ModelSkill,
                )
                .with_confirmation(None)
                .with_credit_cost(|_| 10),
                ToolDefinition::new(
                    "build_utm_link",
                    "Build a UTM-tagged landing URL for a campaign",
                    json!({
                        "type": "object",
                        "properties": {
                            "base_url": { "type": "string" },
                            "source": { "type": "string" },
                            "medium": { "type": "string" },
                            "campaign": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["base_url", "source", "medium", "campaign"],
                        "additionalProperties": false
                    }),
                    ToolBackend::Utility,
                ),
            ],
        },
        // Fallback skill: conversational utilities only, nothing
        // side-effecting. Selected iff no other skill matches.
        Skill {
            name: GENERAL_SKILL,
            description: "General conversation helpers",
            triggers: &[],
            tools: vec![
                ToolDefinition::new(
                    "current_time",
                    "Current UTC date and time",
                    json!({
                        "type": "object",
                        "properties": {},
                        "additionalProperties": false
                    }),
                    ToolBackend::Utility,
                ),
                ToolDefinition::new(
                    "calculate_budget_split",
                    "Split a total budget across channels by weight",
                    json!({
                        "type": "object",
                        "properties": {
                            "total_budget": { "type": "number", "exclusiveMinimum": 0 },
                            "channels": {
                                "type": "array",
                                "minItems": 1,
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string" },
                                        "weight": { "type": "number", "exclusiveMinimum": 0 }
                                    },
                                    "required": ["name"],
                                    "additionalProperties": false
                                }
                            }
                        },
                        "required": ["total_budget", "channels"],
                        "additionalProperties": false
                    }),
                    ToolBackend::Utility,
                ),
            ],
        },
    ]
}

fn variant_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "label": { "type": "string" },
            "visits": { "type": "integer", "minimum": 0 },
            "conversions": { "type": "integer", "minimum": 0 }
        },
        "required": ["label", "visits", "conversions"],
        "additionalProperties": false
    })
}

fn ad_copy_cost(arguments: &Value) -> i64 {
    let variants = arguments
        .get("variant_count")
        .and_then(Value::as_i64)
        .unwrap_or(1)
        .max(1);
    5 * variants
}

fn budget_confirmation_options(arguments: &Value) -> Vec<ConfirmationOption> {
    let budget = arguments
        .get("daily_budget")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    vec![
        ConfirmationOption {
            label: format!("Apply ${budget:.2}/day immediately"),
            payload: arguments.clone(),
        },
        ConfirmationOption {
            label: format!("Apply ${budget:.2}/day from next midnight"),
            payload: merge_effective_at(arguments, "next_midnight"),
        },
    ]
}

fn merge_effective_at(arguments: &Value, effective_at: &str) -> Value {
    let mut merged = arguments.clone();
    if let Value::Object(map) = &mut merged {
        map.insert("effective_at".to_string(), Value::String(effective_at.to_string()));
    }
    merged
}
