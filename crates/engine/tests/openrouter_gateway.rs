use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use engine::llm::{
    ChatModelGateway, ModelGatewayError, ModelMessage, ModelRequest, ModelRole, OpenRouterConfig,
    OpenRouterGateway, OpenRouterModelRoute,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

#[derive(Debug, Clone)]
struct MockReply {
    status: StatusCode,
    body: Value,
}

#[derive(Debug, Clone)]
struct TestServerState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    seen_models: Arc<Mutex<Vec<String>>>,
}

impl TestServerState {
    fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen_models: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

async fn chat_completions(
    State(state): State<TestServerState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(model) = body.get("model").and_then(Value::as_str) {
        state.seen_models.lock().await.push(model.to_string());
    }

    match state.replies.lock().await.pop_front() {
        Some(reply) => (reply.status, Json(reply.body)),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": "no_scripted_reply" } })),
        ),
    }
}

async fn spawn_test_server(
    state: TestServerState,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener has an address");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("test server should run");
    });

    (
        format!("http://{addr}/v1/chat/completions"),
        shutdown_tx,
        server_task,
    )
}

fn config_for(url: String, max_retries: u32, backoff_ms: u64) -> OpenRouterConfig {
    OpenRouterConfig {
        chat_completions_url: url,
        api_key: "test-key".to_string(),
        timeout_ms: 2_000,
        max_retries,
        retry_base_backoff_ms: backoff_ms,
        model_route: OpenRouterModelRoute {
            primary_model: "primary/model".to_string(),
            fallback_model: Some("fallback/model".to_string()),
        },
    }
}

fn chat_request() -> ModelRequest {
    ModelRequest {
        system_prompt: "You are the advertising assistant.".to_string(),
        messages: vec![ModelMessage::text(ModelRole::User, "pause campaign c-1")],
        tools: Vec::new(),
    }
}

fn success_body(model: &str) -> Value {
    json!({
        "id": "gen-123",
        "model": model,
        "choices": [{
            "message": {
                "content": "Pausing it now.",
                "tool_calls": [{
                    "id": "call-abc",
                    "type": "function",
                    "function": {
                        "name": "set_campaign_status",
                        "arguments": "{\"campaign_id\":\"c-1\",\"status\":\"paused\"}"
                    }
                }]
            }
        }],
        "usage": { "prompt_tokens": 40, "completion_tokens": 12, "total_tokens": 52 }
    })
}

#[tokio::test]
async fn parses_text_tool_calls_and_usage() {
    let state = TestServerState::with_replies(vec![MockReply {
        status: StatusCode::OK,
        body: success_body("provider-model"),
    }]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = OpenRouterGateway::new(config_for(url, 1, 0)).expect("gateway should build");
    let completion = gateway
        .generate(chat_request())
        .await
        .expect("scripted success should parse");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(completion.model, "provider-model");
    assert_eq!(completion.text, "Pausing it now.");
    assert_eq!(completion.tool_calls.len(), 1);
    let call = &completion.tool_calls[0];
    assert_eq!(call.id, "call-abc");
    assert_eq!(call.name, "set_campaign_status");
    assert_eq!(call.arguments["status"], "paused");
    assert_eq!(completion.usage.unwrap().total_tokens, 52);
}

#[tokio::test]
async fn retries_transient_failures_then_succeeds() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: json!({ "error": { "code": "overloaded" } }),
        },
        MockReply {
            status: StatusCode::OK,
            body: success_body("primary/model"),
        },
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = OpenRouterGateway::new(config_for(url, 2, 0)).expect("gateway should build");
    let completion = gateway
        .generate(chat_request())
        .await
        .expect("retry should recover");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(completion.text, "Pausing it now.");
    let seen = state.seen_models.lock().await.clone();
    assert_eq!(seen, vec!["primary/model", "primary/model"]);
}

#[tokio::test]
async fn non_retryable_status_fails_without_another_attempt_on_the_same_model() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": { "code": "invalid_request" } }),
        },
        // Consumed by the fallback model, which also fails hard.
        MockReply {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": { "code": "invalid_request" } }),
        },
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = OpenRouterGateway::new(config_for(url, 3, 0)).expect("gateway should build");
    let err = gateway
        .generate(chat_request())
        .await
        .expect_err("bad request should not be retried into success");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(err, ModelGatewayError::ProviderFailure(_)));
    let seen = state.seen_models.lock().await.clone();
    // One attempt per candidate model, no per-model retries.
    assert_eq!(seen, vec!["primary/model", "fallback/model"]);
}

#[tokio::test]
async fn falls_back_to_the_secondary_model_after_primary_exhaustion() {
    let state = TestServerState::with_replies(vec![
        MockReply {
            status: StatusCode::BAD_GATEWAY,
            body: json!({ "error": { "code": "upstream_down" } }),
        },
        MockReply {
            status: StatusCode::BAD_GATEWAY,
            body: json!({ "error": { "code": "upstream_down" } }),
        },
        MockReply {
            status: StatusCode::OK,
            body: success_body("fallback/model"),
        },
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = OpenRouterGateway::new(config_for(url, 1, 0)).expect("gateway should build");
    let completion = gateway
        .generate(chat_request())
        .await
        .expect("fallback model should answer");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(completion.model, "fallback/model");
    let seen = state.seen_models.lock().await.clone();
    assert_eq!(
        seen,
        vec!["primary/model", "primary/model", "fallback/model"]
    );
}
