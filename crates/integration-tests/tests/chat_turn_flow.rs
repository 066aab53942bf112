mod support;

use engine::config::EngineConfig;
use engine::models::{ChatRequest, MessageRole};
use engine::store::SessionStore;
use engine::stream::{StreamEvent, TurnStatus};
use serde_json::json;
use support::mock_model::{final_answer, plan_tool_calls, provider_failure};
use support::mock_platform::MockPlatform;
use uuid::Uuid;

fn chat(session_id: Uuid, user_id: Uuid, message: &str) -> ChatRequest {
    ChatRequest {
        session_id: Some(session_id),
        user_id,
        message: message.to_string(),
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn plain_answer_turn_persists_exactly_one_assistant_message() {
    let harness = support::build_harness(
        EngineConfig::default(),
        vec![final_answer("Happy to help with your campaigns.")],
        MockPlatform::new(),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "hello there"))
        .await
        .unwrap();

    let events = support::collect_turn_events(&mut rx).await;
    assert!(matches!(
        &events[0],
        StreamEvent::Content { delta } if delta == "Happy to help with your campaigns."
    ));
    assert!(matches!(
        events.last().unwrap(),
        StreamEvent::Done {
            status: TurnStatus::Completed,
            error: None,
        }
    ));
    let done_count = events
        .iter()
        .filter(|event| matches!(event, StreamEvent::Done { .. }))
        .count();
    assert_eq!(done_count, 1);

    let messages = harness.store.list_messages(session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, "Happy to help with your campaigns.");
}

#[tokio::test]
async fn tool_turn_streams_metadata_and_concatenates_content() {
    let harness = support::build_harness(
        EngineConfig::default(),
        vec![
            plan_tool_calls(
                "Checking the numbers.",
                vec![(
                    "call-1",
                    "analyze_ab_test",
                    json!({
                        "variant_a": { "label": "A", "visits": 1000, "conversions": 100 },
                        "variant_b": { "label": "B", "visits": 1000, "conversions": 150 }
                    }),
                )],
            ),
            final_answer("Variant B wins with over 99.9% confidence."),
        ],
        MockPlatform::new(),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "analyze my a/b test results"))
        .await
        .unwrap();

    let events = support::collect_turn_events(&mut rx).await;
    let names: Vec<&str> = events.iter().map(|event| event.event_name()).collect();
    assert_eq!(names, vec!["content", "metadata", "content", "done"]);

    let StreamEvent::Metadata { payload } = &events[1] else {
        panic!("expected metadata event");
    };
    assert_eq!(payload["tool"], "analyze_ab_test");
    assert_eq!(payload["result"]["outcome"], "tested");

    let messages = harness.store.list_messages(session_id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, MessageRole::Tool);

    let assistant = &messages[2];
    assert_eq!(assistant.role, MessageRole::Assistant);
    assert_eq!(
        assistant.content,
        "Checking the numbers.\n\nVariant B wins with over 99.9% confidence."
    );
    assert_eq!(assistant.tool_calls.len(), 1);
    // The tool-result message references the recorded call.
    assert_eq!(messages[1].tool_call_id, Some(assistant.tool_calls[0].id));
}

#[tokio::test(start_paused = true)]
async fn parallel_tool_results_merge_in_request_order() {
    // c-1 is the slowest and c-2 the fastest; merged order must still be
    // the order the model requested them in.
    let harness = support::build_harness(
        EngineConfig::default(),
        vec![
            plan_tool_calls(
                "",
                vec![
                    ("call-1", "fetch_campaign_metrics", json!({ "campaign_id": "c-1" })),
                    ("call-2", "fetch_campaign_metrics", json!({ "campaign_id": "c-2" })),
                    ("call-3", "fetch_campaign_metrics", json!({ "campaign_id": "c-3" })),
                ],
            ),
            final_answer("All three campaigns summarized."),
        ],
        MockPlatform::with_campaign_delays(&[("c-1", 300), ("c-2", 10), ("c-3", 100)]),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "report on all three campaigns"))
        .await
        .unwrap();
    support::collect_turn_events(&mut rx).await;

    let messages = harness.store.list_messages(session_id).await.unwrap();
    let tool_results: Vec<String> = messages
        .iter()
        .filter(|message| message.role == MessageRole::Tool)
        .map(|message| {
            let payload: serde_json::Value = serde_json::from_str(&message.content).unwrap();
            payload["campaign_id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(tool_results, vec!["c-1", "c-2", "c-3"]);

    let assistant = messages.last().unwrap();
    let record_order: Vec<&str> = assistant
        .tool_calls
        .iter()
        .map(|record| record.arguments["campaign_id"].as_str().unwrap())
        .collect();
    assert_eq!(record_order, vec!["c-1", "c-2", "c-3"]);
}

#[tokio::test]
async fn requests_beyond_the_parallel_cap_fail_visibly() {
    let config = EngineConfig {
        max_parallel_tools: 2,
        ..EngineConfig::default()
    };
    let harness = support::build_harness(
        config,
        vec![
            plan_tool_calls(
                "",
                vec![
                    ("call-1", "fetch_campaign_metrics", json!({ "campaign_id": "c-1" })),
                    ("call-2", "fetch_campaign_metrics", json!({ "campaign_id": "c-2" })),
                    ("call-3", "fetch_campaign_metrics", json!({ "campaign_id": "c-3" })),
                ],
            ),
            final_answer("Covered what I could."),
        ],
        MockPlatform::new(),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "compare campaign metrics"))
        .await
        .unwrap();
    support::collect_turn_events(&mut rx).await;

    assert_eq!(harness.platform.calls().len(), 2);

    let messages = harness.store.list_messages(session_id).await.unwrap();
    let third_result = messages
        .iter()
        .filter(|message| message.role == MessageRole::Tool)
        .nth(2)
        .unwrap();
    assert!(third_result.content.contains("parallel_limit_exceeded"));
}

#[tokio::test]
async fn step_exhaustion_fails_the_turn_as_too_complex() {
    let config = EngineConfig {
        max_planning_steps: 2,
        ..EngineConfig::default()
    };
    let harness = support::build_harness(
        config,
        vec![
            plan_tool_calls("", vec![("call-1", "current_time", json!({}))]),
            plan_tool_calls("", vec![("call-2", "current_time", json!({}))]),
        ],
        MockPlatform::new(),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "hello"))
        .await
        .unwrap();

    let events = support::collect_turn_events(&mut rx).await;
    let StreamEvent::Done {
        status: TurnStatus::Failed,
        error: Some(body),
    } = events.last().unwrap()
    else {
        panic!("expected a failed done event");
    };
    assert_eq!(body.code, "task_too_complex");

    // The error turn still persists consistently: user message, the tool
    // results that did run, and one assistant message.
    let messages = harness.store.list_messages(session_id).await.unwrap();
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages.last().unwrap().role, MessageRole::Assistant);
    assert!(messages.last().unwrap().content.contains("steps"));
}

#[tokio::test]
async fn model_failure_surfaces_a_stable_error_code() {
    let harness = support::build_harness(
        EngineConfig::default(),
        vec![provider_failure("status=503 code=overloaded")],
        MockPlatform::new(),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "hello"))
        .await
        .unwrap();

    let events = support::collect_turn_events(&mut rx).await;
    let StreamEvent::Done {
        status: TurnStatus::Failed,
        error: Some(body),
    } = events.last().unwrap()
    else {
        panic!("expected a failed done event");
    };
    assert_eq!(body.code, "model_unavailable");

    let messages = harness.store.list_messages(session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn the_model_only_sees_tools_from_selected_skills() {
    let harness = support::build_harness(
        EngineConfig::default(),
        vec![final_answer("Here's the performance picture.")],
        MockPlatform::new(),
        0,
    );
    let session_id = Uuid::new_v4();
    let mut rx = harness.engine.streams().subscribe(session_id);

    harness
        .engine
        .clone()
        .submit(chat(session_id, harness.user_id, "show me a performance report"))
        .await
        .unwrap();
    support::collect_turn_events(&mut rx).await;

    // The analytics skill exposes exactly three tools; nothing else leaks
    // into the planning request.
    assert_eq!(harness.model.seen_tool_counts(), vec![3]);
}
