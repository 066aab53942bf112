//! The turn state machine: received -> planning -> {tool_dispatch |
//! responding} -> persisted, with an awaiting_confirmation sub-cycle and
//! an error path reachable from anywhere. Turns within a session are
//! strictly serialized; sessions run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::confirm::{ConfirmError, ConfirmationBroker, ConfirmationOutcome};
use crate::dispatch::{DispatchError, ToolDispatcher};
use crate::ledger::CreditLedger;
use crate::llm::{
    ChatModelGateway, ModelGatewayError, ModelMessage, ModelRequest, ModelRole, ToolCallRequest,
    ToolSpec,
};
use crate::models::{
    ChatAccepted, ChatRequest, ConfirmChoice, ConfirmResolution, ErrorBody, Message, MessageRole,
    Session, ToolCall, ToolCallRecord, ToolCallStatus, ToolFailure,
};
use crate::platform::DataPlatform;
use crate::registry::ToolRegistry;
use crate::skills::{Skill, select_skills};
use crate::store::{SessionStore, StoreError, TurnCheckpoint};
use crate::stream::{StreamEvent, TurnStatus, TurnStreams};

const SYSTEM_PROMPT_HEADER: &str = "You are the advertising assistant embedded in the campaign \
dashboard. You help advertisers create ads, understand performance, and manage campaigns. Use \
the available tools when they apply; answer directly when they do not. Report tool failures \
honestly instead of inventing results.";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
enum TurnError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelGatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("planning step limit reached")]
    StepLimit,
    #[error("turn cancelled by caller")]
    Cancelled,
    #[error("internal turn failure: {0}")]
    Internal(String),
}

impl TurnError {
    fn error_body(&self) -> ErrorBody {
        let (code, message) = match self {
            Self::Model(_) => (
                "model_unavailable",
                "The assistant could not reach the model service",
            ),
            Self::Store(_) => ("storage_failure", "The conversation could not be saved"),
            Self::Dispatch(_) => ("ledger_failure", "Credit accounting failed for this turn"),
            Self::StepLimit => (
                "task_too_complex",
                "The task needed more steps than one turn allows",
            ),
            Self::Cancelled => ("cancelled", "The turn was cancelled"),
            Self::Internal(_) => ("internal_error", "Unexpected server error"),
        };
        ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    fn user_facing_text(&self) -> String {
        match self {
            Self::StepLimit => "I could not finish this task within the allowed number of \
                                steps. Try splitting it into smaller requests."
                .to_string(),
            Self::Cancelled => "This request was cancelled.".to_string(),
            _ => "Something went wrong while handling this request. Please try again.".to_string(),
        }
    }
}

struct TurnReport {
    steps: usize,
    tool_calls: usize,
}

struct DispatchedCall {
    call: ToolCall,
    provider_id: String,
}

/// The conversational engine: one instance serves every session.
pub struct ChatEngine {
    config: EngineConfig,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ChatModelGateway>,
    dispatcher: ToolDispatcher,
    broker: ConfirmationBroker,
    streams: TurnStreams,
    turn_locks: AsyncMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    cancellations: std::sync::Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl ChatEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        ledger: Arc<dyn CreditLedger>,
        model: Arc<dyn ChatModelGateway>,
        platform: Arc<dyn DataPlatform>,
    ) -> Arc<Self> {
        let dispatcher = ToolDispatcher::new(
            config.clone(),
            Arc::clone(&registry),
            ledger,
            Arc::clone(&model),
            platform,
        );
        let streams = TurnStreams::new(config.stream_channel_capacity);

        Arc::new(Self {
            config,
            registry,
            store,
            model,
            dispatcher,
            broker: ConfirmationBroker::new(),
            streams,
            turn_locks: AsyncMutex::new(HashMap::new()),
            cancellations: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn streams(&self) -> &TurnStreams {
        &self.streams
    }

    /// Accept a message and start its turn asynchronously. The stream
    /// channel exists before this returns, so a caller who opens the SSE
    /// stream right after intake sees the whole turn.
    pub async fn submit(self: Arc<Self>, request: ChatRequest) -> Result<ChatAccepted, SubmitError> {
        if request.message.trim().is_empty() {
            return Err(SubmitError::EmptyMessage);
        }

        let session = self
            .store
            .find_or_create_session(request.session_id, request.user_id, Value::Null)
            .await?;
        let _ = self.streams.publisher(session.id);

        let engine = Arc::clone(&self);
        let user_message = Message::user(request.message, request.attachments);
        let session_id = session.id;
        tokio::spawn(async move {
            engine.run_turn(session, user_message).await;
        });

        Ok(ChatAccepted { session_id })
    }

    /// Resolve a pending confirmation gate for a suspended turn.
    pub fn resolve_confirmation(
        &self,
        session_id: Uuid,
        tool_call_id: Uuid,
        choice: ConfirmChoice,
    ) -> Result<ConfirmResolution, ConfirmError> {
        self.broker.resolve(session_id, tool_call_id, choice)
    }

    /// Best-effort cancellation of the session's in-flight turn. Running
    /// tool calls settle their own ledger brackets before the turn ends.
    pub fn cancel_turn(&self, session_id: Uuid) -> bool {
        let cancellations = self.lock_cancellations();
        match cancellations.get(&session_id) {
            Some(flag) => flag.send(true).is_ok(),
            None => false,
        }
    }

    async fn run_turn(self: Arc<Self>, session: Session, user_message: Message) {
        let turn_lock = self.turn_lock_for(session.id).await;
        let _guard = turn_lock.lock().await;

        let cancel_rx = self.register_cancellation(session.id);
        let started = Instant::now();
        let mut transcript = vec![user_message];
        let result = self.turn_inner(&session, cancel_rx, &mut transcript).await;
        self.clear_cancellation(session.id);

        match result {
            Ok(report) => {
                info!(
                    session_id = %session.id,
                    steps = report.steps,
                    tool_calls = report.tool_calls,
                    turn_ms = started.elapsed().as_millis() as u64,
                    "turn completed"
                );
                self.streams.publish(
                    session.id,
                    StreamEvent::Done {
                        status: TurnStatus::Completed,
                        error: None,
                    },
                );
            }
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    error = %err,
                    turn_ms = started.elapsed().as_millis() as u64,
                    "turn failed"
                );
                self.broker.cancel_session(session.id);

                // The error turn still persists atomically: user message,
                // any tool results gathered so far, one assistant message.
                transcript.push(Message::assistant(err.user_facing_text(), Vec::new()));
                if let Err(persist_err) = self.store.append_messages(session.id, &transcript).await
                {
                    error!(
                        session_id = %session.id,
                        error = %persist_err,
                        "failed to persist error turn"
                    );
                }

                self.streams.publish(
                    session.id,
                    StreamEvent::Done {
                        status: TurnStatus::Failed,
                        error: Some(err.error_body()),
                    },
                );
            }
        }
    }

    async fn turn_inner(
        &self,
        session: &Session,
        mut cancel: watch::Receiver<bool>,
        transcript: &mut Vec<Message>,
    ) -> Result<TurnReport, TurnError> {
        // received: skill selection runs once, against the incoming message.
        let history = self.store.list_messages(session.id).await?;
        let user_message = transcript[0].clone();
        let selected = select_skills(
            &user_message.content,
            self.registry.skills(),
            self.config.max_skills_per_turn,
        );
        let skill_names: Vec<&str> = selected.iter().map(|skill| skill.name).collect();
        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            skills = ?skill_names,
            history_len = history.len(),
            "turn received"
        );

        let tool_specs: Vec<ToolSpec> = self
            .registry
            .tools_for_skills(&selected)
            .iter()
            .map(|definition| ToolSpec {
                name: definition.name.to_string(),
                description: definition.description.to_string(),
                input_schema: definition.input_schema.clone(),
            })
            .collect();

        let mut model_messages = history_to_model_messages(&history);
        model_messages.push(model_message_for(&user_message));

        let mut assistant_text = String::new();
        let mut turn_records: Vec<ToolCallRecord> = Vec::new();

        for step in 0..self.config.max_planning_steps {
            let request = ModelRequest {
                system_prompt: system_prompt(&selected),
                messages: model_messages.clone(),
                tools: tool_specs.clone(),
            };

            let completion = tokio::select! {
                _ = cancelled(&mut cancel) => return Err(TurnError::Cancelled),
                result = self.model.generate(request) => result?,
            };

            if !completion.text.is_empty() {
                self.streams.publish(
                    session.id,
                    StreamEvent::Content {
                        delta: completion.text.clone(),
                    },
                );
                if !assistant_text.is_empty() {
                    assistant_text.push_str("\n\n");
                }
                assistant_text.push_str(&completion.text);
            }

            if completion.tool_calls.is_empty() {
                // responding -> persisted: exactly one assistant message,
                // its content the concatenation of the streamed deltas.
                let tool_calls = turn_records.len();
                transcript.push(Message::assistant(assistant_text, turn_records));
                self.store.append_messages(session.id, transcript).await?;
                return Ok(TurnReport {
                    steps: step + 1,
                    tool_calls,
                });
            }

            let dispatched = self
                .run_tool_step(session, &completion.tool_calls, &mut cancel)
                .await?;
            turn_records.extend(dispatched.iter().map(|dispatched_call| ToolCallRecord {
                id: dispatched_call.call.id,
                name: dispatched_call.call.name.clone(),
                arguments: dispatched_call.call.arguments.clone(),
            }));

            // Feed results back in request order, regardless of completion
            // order, for both the model context and the transcript.
            let mut assistant_context = ModelMessage::text(ModelRole::Assistant, completion.text);
            assistant_context.tool_calls = completion.tool_calls.clone();
            model_messages.push(assistant_context);

            for dispatched_call in &dispatched {
                let payload = tool_result_payload(&dispatched_call.call);
                transcript.push(Message::tool_result(dispatched_call.call.id, payload.clone()));

                let mut tool_message = ModelMessage::text(ModelRole::Tool, payload);
                tool_message.tool_call_id = Some(dispatched_call.provider_id.clone());
                model_messages.push(tool_message);

                if dispatched_call.call.status == ToolCallStatus::Succeeded
                    && let Some(result) = &dispatched_call.call.result
                {
                    self.streams.publish(
                        session.id,
                        StreamEvent::Metadata {
                            payload: json!({
                                "tool": dispatched_call.call.name,
                                "tool_call_id": dispatched_call.call.id,
                                "result": result,
                            }),
                        },
                    );
                }
            }
        }

        Err(TurnError::StepLimit)
    }

    /// Execute one planning step's tool requests: confirmation gates are
    /// awaited sequentially in request order, everything runnable then
    /// dispatches concurrently, and results merge back in request order.
    async fn run_tool_step(
        &self,
        session: &Session,
        requests: &[ToolCallRequest],
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Vec<DispatchedCall>, TurnError> {
        let mut slots: Vec<Option<DispatchedCall>> = Vec::new();
        slots.resize_with(requests.len(), || None);
        let mut runnable: Vec<(usize, ToolCall, String)> = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let mut call = ToolCall::requested(request.name.clone(), request.arguments.clone());

            if index >= self.config.max_parallel_tools {
                call.status = ToolCallStatus::Failed;
                call.error = Some(ToolFailure::new(
                    "parallel_limit_exceeded",
                    format!(
                        "at most {} tool calls may run in one planning step",
                        self.config.max_parallel_tools
                    ),
                    false,
                ));
                slots[index] = Some(DispatchedCall {
                    call,
                    provider_id: request.id.clone(),
                });
                continue;
            }

            let requires_confirmation = self
                .registry
                .get(&request.name)
                .is_some_and(|definition| definition.requires_confirmation);
            if requires_confirmation {
                match self.await_confirmation(session, &mut call, cancel).await? {
                    Some(confirmed_arguments) => {
                        call.arguments = confirmed_arguments;
                        runnable.push((index, call, request.id.clone()));
                    }
                    None => {
                        slots[index] = Some(DispatchedCall {
                            call,
                            provider_id: request.id.clone(),
                        });
                    }
                }
            } else {
                runnable.push((index, call, request.id.clone()));
            }
        }

        let mut join_set = JoinSet::new();
        for (index, call, provider_id) in runnable {
            let dispatcher = self.dispatcher.clone();
            let user_id = session.user_id;
            join_set.spawn(async move {
                let outcome = dispatcher.dispatch(call, user_id).await;
                (index, provider_id, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (index, provider_id, outcome) =
                joined.map_err(|err| TurnError::Internal(format!("dispatch task failed: {err}")))?;
            let call = outcome?;
            slots[index] = Some(DispatchedCall { call, provider_id });
        }

        if *cancel.borrow() {
            return Err(TurnError::Cancelled);
        }

        let mut dispatched = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(call) => dispatched.push(call),
                None => {
                    return Err(TurnError::Internal(
                        "tool request slot left unfilled".to_string(),
                    ));
                }
            }
        }
        Ok(dispatched)
    }

    /// awaiting_confirmation: the only state that outlives a single
    /// request/response cycle. The checkpoint is persisted so a restarted
    /// process can re-offer the gate; no ledger reservation is held here.
    async fn await_confirmation(
        &self,
        session: &Session,
        call: &mut ToolCall,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Option<Value>, TurnError> {
        let definition = self
            .registry
            .get(&call.name)
            .ok_or_else(|| TurnError::Internal(format!("tool {} vanished mid-turn", call.name)))?;
        let options = definition.confirmation_options(&call.arguments);

        call.status = ToolCallStatus::AwaitingConfirmation;
        self.store
            .save_checkpoint(&TurnCheckpoint {
                session_id: session.id,
                tool_call_id: call.id,
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                options: options.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let resolution = self.broker.begin(session.id, call.id, options.clone());
        self.streams.publish(
            session.id,
            StreamEvent::ConfirmationRequest {
                tool_call_id: call.id,
                options,
            },
        );
        info!(session_id = %session.id, tool = %call.name, tool_call_id = %call.id, "awaiting confirmation");

        let outcome = tokio::select! {
            _ = cancelled(cancel) => {
                self.store.clear_checkpoint(session.id, call.id).await?;
                return Err(TurnError::Cancelled);
            }
            outcome = resolution => outcome,
        };
        self.store.clear_checkpoint(session.id, call.id).await?;

        match outcome {
            Ok(ConfirmationOutcome::Chosen(payload)) => Ok(Some(payload)),
            Ok(ConfirmationOutcome::Cancelled) | Err(_) => {
                call.status = ToolCallStatus::Failed;
                call.error = Some(ToolFailure::cancelled());
                info!(session_id = %session.id, tool = %call.name, "confirmation cancelled");
                Ok(None)
            }
        }
    }

    async fn turn_lock_for(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        Arc::clone(locks.entry(session_id).or_default())
    }

    fn register_cancellation(&self, session_id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.lock_cancellations().insert(session_id, tx);
        rx
    }

    fn clear_cancellation(&self, session_id: Uuid) {
        self.lock_cancellations().remove(&session_id);
    }

    fn lock_cancellations(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<Uuid, watch::Sender<bool>>> {
        match self.cancellations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone: this turn can no longer be cancelled.
            std::future::pending::<()>().await;
        }
    }
}

fn system_prompt(selected: &[&Skill]) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT_HEADER);
    prompt.push_str("\n\nActive capabilities this turn:");
    for skill in selected {
        prompt.push_str(&format!("\n- {}: {}", skill.name, skill.description));
    }
    prompt
}

/// Persisted history as model context. Only user and assistant messages
/// are replayed; per-turn tool plumbing is not reconstructed, the
/// assistant's final text already reflects those outcomes.
fn history_to_model_messages(history: &[Message]) -> Vec<ModelMessage> {
    history
        .iter()
        .filter(|message| message.role != MessageRole::Tool)
        .map(model_message_for)
        .collect()
}

fn model_message_for(message: &Message) -> ModelMessage {
    let role = match message.role {
        MessageRole::User => ModelRole::User,
        MessageRole::Assistant => ModelRole::Assistant,
        MessageRole::Tool => ModelRole::Tool,
    };
    let mut model_message = ModelMessage::text(role, message.content.clone());
    model_message.attachments = message.attachments.clone();
    model_message
}

fn tool_result_payload(call: &ToolCall) -> String {
    match (&call.result, &call.error) {
        (Some(result), _) => result.to_string(),
        (None, Some(failure)) => json!({
            "error": {
                "code": failure.code,
                "message": failure.message,
                "retryable": failure.retryable,
            }
        })
        .to_string(),
        (None, None) => json!({ "error": { "code": "unknown", "message": "no result recorded" } })
            .to_string(),
    }
}
