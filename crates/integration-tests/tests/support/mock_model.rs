use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use engine::llm::{
    ChatModelGateway, ModelCompletion, ModelGatewayError, ModelGatewayFuture, ModelRequest,
    ToolCallRequest,
};
use serde_json::Value;

/// Replays a planned sequence of completions, one per planning step.
pub struct ScriptedModelGateway {
    replies: Mutex<VecDeque<Result<ModelCompletion, ModelGatewayError>>>,
    calls: AtomicUsize,
    seen_tool_counts: Mutex<Vec<usize>>,
}

impl ScriptedModelGateway {
    pub fn new(replies: Vec<Result<ModelCompletion, ModelGatewayError>>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            calls: AtomicUsize::new(0),
            seen_tool_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of tool definitions exposed on each planning request, in
    /// call order.
    pub fn seen_tool_counts(&self) -> Vec<usize> {
        self.seen_tool_counts.lock().unwrap().clone()
    }
}

impl ChatModelGateway for ScriptedModelGateway {
    fn generate<'a>(&'a self, request: ModelRequest) -> ModelGatewayFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tool_counts.lock().unwrap().push(request.tools.len());
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ModelGatewayError::ProviderFailure(
                "scripted replies exhausted".to_string(),
            ))
        });
        Box::pin(async move { reply })
    }
}

pub fn final_answer(text: &str) -> Result<ModelCompletion, ModelGatewayError> {
    Ok(ModelCompletion {
        model: "scripted-model".to_string(),
        provider_request_id: None,
        text: text.to_string(),
        tool_calls: Vec::new(),
        usage: None,
    })
}

pub fn plan_tool_calls(
    text: &str,
    calls: Vec<(&str, &str, Value)>,
) -> Result<ModelCompletion, ModelGatewayError> {
    Ok(ModelCompletion {
        model: "scripted-model".to_string(),
        provider_request_id: None,
        text: text.to_string(),
        tool_calls: calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })
            .collect(),
        usage: None,
    })
}

pub fn provider_failure(message: &str) -> Result<ModelCompletion, ModelGatewayError> {
    Err(ModelGatewayError::ProviderFailure(message.to_string()))
}
