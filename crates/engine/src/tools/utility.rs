//! In-process utility tools: deterministic, side-effect free, no retry.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::config::EngineConfig;
use crate::models::ToolFailure;
use crate::significance::{self, VariantStats};

pub fn execute_utility(
    name: &str,
    arguments: &Value,
    config: &EngineConfig,
) -> Result<Value, ToolFailure> {
    match name {
        "current_time" => Ok(json!({ "utc": Utc::now().to_rfc3339() })),
        "calculate_budget_split" => budget_split(arguments),
        "analyze_ab_test" => analyze_ab_test(arguments, config),
        "build_utm_link" => build_utm_link(arguments),
        other => Err(ToolFailure::new(
            "unknown_utility",
            format!("no utility implementation registered for {other}"),
            false,
        )),
    }
}

#[derive(Deserialize)]
struct BudgetSplitArgs {
    total_budget: f64,
    channels: Vec<BudgetChannel>,
}

#[derive(Deserialize)]
struct BudgetChannel {
    name: String,
    #[serde(default)]
    weight: Option<f64>,
}

fn budget_split(arguments: &Value) -> Result<Value, ToolFailure> {
    let args: BudgetSplitArgs = parse_args(arguments)?;
    let total_weight: f64 = args
        .channels
        .iter()
        .map(|channel| channel.weight.unwrap_or(1.0))
        .sum();
    if total_weight <= 0.0 {
        return Err(ToolFailure::new(
            "invalid_params",
            "channel weights must sum to a positive value",
            false,
        ));
    }

    let splits: Vec<Value> = args
        .channels
        .iter()
        .map(|channel| {
            let share = channel.weight.unwrap_or(1.0) / total_weight;
            let amount = (args.total_budget * share * 100.0).round() / 100.0;
            json!({ "name": channel.name, "amount": amount })
        })
        .collect();

    Ok(json!({ "total_budget": args.total_budget, "splits": splits }))
}

#[derive(Deserialize)]
struct AbTestArgs {
    variant_a: VariantStats,
    variant_b: VariantStats,
}

fn analyze_ab_test(arguments: &Value, config: &EngineConfig) -> Result<Value, ToolFailure> {
    let args: AbTestArgs = parse_args(arguments)?;
    let outcome = significance::evaluate(
        &args.variant_a,
        &args.variant_b,
        config.min_sample_conversions,
        config.significance_alpha,
    )
    .map_err(|err| ToolFailure::new("invalid_variant_stats", err.to_string(), false))?;

    serde_json::to_value(&outcome).map_err(|err| {
        ToolFailure::new("serialization_failed", err.to_string(), false)
    })
}

#[derive(Deserialize)]
struct UtmLinkArgs {
    base_url: String,
    source: String,
    medium: String,
    campaign: String,
    #[serde(default)]
    content: Option<String>,
}

fn build_utm_link(arguments: &Value) -> Result<Value, ToolFailure> {
    let args: UtmLinkArgs = parse_args(arguments)?;
    let mut url = Url::parse(&args.base_url).map_err(|err| {
        ToolFailure::new("invalid_params", format!("base_url is not a valid URL: {err}"), false)
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("utm_source", &args.source);
        query.append_pair("utm_medium", &args.medium);
        query.append_pair("utm_campaign", &args.campaign);
        if let Some(content) = &args.content {
            query.append_pair("utm_content", content);
        }
    }

    Ok(json!({ "url": url.to_string() }))
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, ToolFailure> {
    serde_json::from_value(arguments.clone())
        .map_err(|err| ToolFailure::new("invalid_params", err.to_string(), false))
}
