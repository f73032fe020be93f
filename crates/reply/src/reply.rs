//! Top-level reply pipeline: normalize the inbound message, resolve the
//! policy, run the coordinator, and converge every failure to a user-facing
//! message.

use std::sync::Arc;

use tracing::{info, warn};

use {
    courier_backend::{InvokeMode, InvokeRequest},
    courier_common::types::{AggregationResult, InboundMessage},
    courier_config::BackendConfig,
};

use crate::{
    cache::CacheKey,
    coordinator::{Coordinator, Outcome},
    error::EMPTY_ANSWER_REPLY,
    policy::resolve_policy,
};

/// Produces aggregated replies for inbound messages.
pub struct ReplyEngine {
    coordinator: Arc<Coordinator>,
    backend: BackendConfig,
}

impl ReplyEngine {
    pub fn new(coordinator: Arc<Coordinator>, backend: BackendConfig) -> Self {
        Self {
            coordinator,
            backend,
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Process one inbound message and produce an aggregated reply.
    ///
    /// `conversation_id` is the backend conversation to continue; the caller
    /// owns that bookkeeping and reads the follow-up id off the result.
    pub async fn get_reply(
        &self,
        msg: &InboundMessage,
        conversation_id: Option<&str>,
    ) -> Outcome {
        let query = msg.attributed_body();

        info!(
            channel = %msg.channel,
            session_key = %msg.session_key,
            from = %msg.from,
            sender = msg.sender_name.as_deref().unwrap_or("unknown"),
            chat = ?msg.chat,
            "incoming message: {}",
            msg.body,
        );

        let policy = resolve_policy(&self.backend, &query);
        let key = CacheKey::build(
            &query,
            &msg.from,
            self.backend.mode.as_str(),
            conversation_id.unwrap_or(""),
        );
        let request = InvokeRequest {
            query,
            user: msg.from.clone(),
            conversation_id: conversation_id.map(str::to_string),
            mode: InvokeMode::from_app_mode(self.backend.mode),
        };

        let (result, error) = self.coordinator.execute(key, request, policy).await;

        if let Some(ref r) = result
            && is_effectively_empty(r)
        {
            warn!(conversation_id = %r.conversation_id, "backend returned an empty answer");
            return (None, Some(EMPTY_ANSWER_REPLY.to_string()));
        }

        (result, error)
    }
}

/// An answer with no segments, or only blank text segments, carries nothing
/// worth delivering.
fn is_effectively_empty(result: &AggregationResult) -> bool {
    result
        .segments
        .iter()
        .all(|s| s.is_text() && s.value.trim().is_empty())
}
