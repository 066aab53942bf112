use std::convert::Infallible;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use engine::models::{CancelAccepted, CancelRequest, ChatRequest, ConfirmAccepted, ConfirmRequest};
use engine::orchestrator::SubmitError;
use engine::stream::StreamEvent;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;
use uuid::Uuid;

use super::AppState;
use super::errors::{bad_request_response, not_found_response, store_error_response};

/// Turn intake: 202 with the session id, the turn itself runs
/// asynchronously and reports through the stream endpoint.
pub(super) async fn submit_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    match state.engine.submit(request).await {
        Ok(accepted) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
        Err(SubmitError::EmptyMessage) => {
            bad_request_response("invalid_message", "Message must not be empty")
        }
        Err(SubmitError::Store(err)) => store_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamParams {
    session_id: Uuid,
}

/// SSE feed of turn events: content/metadata/confirmation_request deltas,
/// then exactly one done event per turn.
pub(super) async fn stream_chat(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Response {
    let session_id = params.session_id;
    match state.store.load_session(session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_response("unknown_session", "No such session"),
        Err(err) => return store_error_response(err),
    }

    let receiver = state.engine.streams().subscribe(session_id);
    let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(event) => sse_event(&event),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(session_id = %session_id, skipped, "sse subscriber lagged, events dropped");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

pub(super) async fn confirm_chat(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Response {
    match state
        .engine
        .resolve_confirmation(request.session_id, request.tool_call_id, request.choice)
    {
        Ok(status) => (StatusCode::OK, Json(ConfirmAccepted { status })).into_response(),
        Err(err) => bad_request_response("invalid_choice", &err.to_string()),
    }
}

pub(super) async fn cancel_chat(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Response {
    let cancelled = state.engine.cancel_turn(request.session_id);
    (StatusCode::OK, Json(CancelAccepted { cancelled })).into_response()
}

fn sse_event(event: &StreamEvent) -> Option<Result<Event, Infallible>> {
    match Event::default().event(event.event_name()).json_data(event) {
        Ok(encoded) => Some(Ok(encoded)),
        Err(err) => {
            warn!("failed to encode stream event: {err}");
            None
        }
    }
}
