//! HTTP surface for the polling relay protocol.
//!
//! The relay POSTs `{request_id, conversation_key, refresh, token, ...}` and
//! must be answered within its own tight budget, so the handler only reads
//! current state — all real work happens on background tasks. Transport
//! encryption and caller authentication are the relay's concern, not ours.

use std::sync::Arc;

use {
    axum::{Json, Router, extract::State, routing::post},
    tracing::debug,
};

use crate::bridge::{PollBridge, PollReply, PollRequest};

/// Build the poll-bridge router.
pub fn router(bridge: Arc<PollBridge>) -> Router {
    Router::new()
        .route("/pollbridge", post(handle_poll))
        .with_state(bridge)
}

async fn handle_poll(
    State(bridge): State<Arc<PollBridge>>,
    Json(request): Json<PollRequest>,
) -> Json<PollReply> {
    debug!(
        request_id = %request.request_id,
        conversation_key = %request.conversation_key,
        refresh = request.refresh,
        "poll call"
    );
    Json(bridge.handle(request))
}
