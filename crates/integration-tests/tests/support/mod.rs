#![allow(dead_code)]

pub mod mock_model;
pub mod mock_platform;

use std::sync::Arc;
use std::time::Duration;

use api_server::http::{AppState, build_router};
use engine::config::EngineConfig;
use engine::ledger::{CreditLedger, MemoryLedger};
use engine::llm::{ChatModelGateway, ModelCompletion, ModelGatewayError};
use engine::orchestrator::ChatEngine;
use engine::platform::DataPlatform;
use engine::registry::ToolRegistry;
use engine::skills::builtin_catalog;
use engine::store::{MemorySessionStore, SessionStore};
use engine::stream::StreamEvent;
use mock_model::ScriptedModelGateway;
use mock_platform::MockPlatform;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_WAIT: Duration = Duration::from_secs(5);

pub struct TestHarness {
    pub engine: Arc<ChatEngine>,
    pub store: Arc<MemorySessionStore>,
    pub ledger: Arc<MemoryLedger>,
    pub model: Arc<ScriptedModelGateway>,
    pub platform: Arc<MockPlatform>,
    pub user_id: Uuid,
}

pub fn build_harness(
    config: EngineConfig,
    model_replies: Vec<Result<ModelCompletion, ModelGatewayError>>,
    platform: MockPlatform,
    starting_credits: i64,
) -> TestHarness {
    let registry = Arc::new(ToolRegistry::build(builtin_catalog()).expect("catalog builds"));
    let store = Arc::new(MemorySessionStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let model = Arc::new(ScriptedModelGateway::new(model_replies));
    let platform = Arc::new(platform);

    let user_id = Uuid::new_v4();
    ledger.grant(user_id, starting_credits);

    let engine = ChatEngine::new(
        config,
        registry,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::clone(&ledger) as Arc<dyn CreditLedger>,
        Arc::clone(&model) as Arc<dyn ChatModelGateway>,
        Arc::clone(&platform) as Arc<dyn DataPlatform>,
    );

    TestHarness {
        engine,
        store,
        ledger,
        model,
        platform,
        user_id,
    }
}

pub fn test_router(harness: &TestHarness) -> axum::Router {
    build_router(AppState {
        engine: Arc::clone(&harness.engine),
        store: Arc::clone(&harness.store) as Arc<dyn SessionStore>,
    })
}

pub async fn next_event(rx: &mut broadcast::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(EVENT_WAIT, rx.recv())
        .await
        .expect("timed out waiting for a stream event")
        .expect("stream channel closed unexpectedly")
}

/// Drain the stream until (and including) the turn's done event.
pub async fn collect_turn_events(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, StreamEvent::Done { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}
