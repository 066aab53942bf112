use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use engine::orchestrator::ChatEngine;
use engine::store::SessionStore;

mod chat;
mod errors;
mod health;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub store: Arc<dyn SessionStore>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/v1/chat", post(chat::submit_chat))
        .route("/v1/chat/stream", get(chat::stream_chat))
        .route("/v1/chat/confirm", post(chat::confirm_chat))
        .route("/v1/chat/cancel", post(chat::cancel_chat))
        .with_state(app_state)
}
