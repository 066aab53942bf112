use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use engine::platform::{DataPlatform, PlatformRpcError};
use serde_json::{Value, json};
use tokio::time::sleep;

/// Always-succeeding data platform that records every call. Per-campaign
/// delays simulate slow RPCs so ordering guarantees can be exercised.
#[derive(Default)]
pub struct MockPlatform {
    delays_ms: HashMap<String, u64>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_campaign_delays(delays: &[(&str, u64)]) -> Self {
        Self {
            delays_ms: delays
                .iter()
                .map(|(campaign, ms)| (campaign.to_string(), *ms))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataPlatform for MockPlatform {
    async fn call_tool(&self, tool: &str, params: Value) -> Result<Value, PlatformRpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), params.clone()));

        let campaign_id = params
            .get("campaign_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if let Some(delay_ms) = self.delays_ms.get(&campaign_id) {
            sleep(Duration::from_millis(*delay_ms)).await;
        }

        match tool {
            "fetch_campaign_metrics" => Ok(json!({
                "campaign_id": campaign_id,
                "impressions": 12_000,
                "clicks": 340,
                "conversions": 41,
            })),
            "list_campaigns" => Ok(json!({
                "campaigns": [
                    { "id": "c-1", "name": "Spring Launch", "status": "active" },
                    { "id": "c-2", "name": "Retargeting", "status": "paused" },
                ]
            })),
            _ => Ok(json!({ "ok": true, "tool": tool })),
        }
    }
}
