//! The poll-bridge synchronizer.
//!
//! Maps a long-running backend job onto a sequence of short poll calls. Every
//! inbound call is answered immediately from the key's current state; the
//! only suspension happens inside the background job.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    dashmap::DashMap,
    rand::{Rng, distr::Alphanumeric},
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use {
    courier_channels::{Multiplexer, SegmentSink},
    courier_common::types::{ChatKind, InboundMessage, ReplySegment},
    courier_config::PollBridgeConfig,
    courier_reply::{ReplyEngine, UNKNOWN_ERROR_REPLY},
};

use crate::state::{PollStatus, SessionHandle};

/// Dedup records are pruned on every Nth trigger.
const PRUNE_EVERY_TRIGGERS: u64 = 64;

/// One inbound call on the polling relay protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    /// External request identifier, used for dedup of relay retries.
    pub request_id: String,
    /// Conversation key — group id for group chats, peer id otherwise.
    pub conversation_key: String,
    /// `true` for a poll/refresh call, `false` for a new message trigger.
    #[serde(default)]
    pub refresh: bool,
    /// Stream token issued by an earlier trigger (refresh calls).
    #[serde(default)]
    pub token: Option<String>,
    /// Sender identifier (trigger calls).
    #[serde(default)]
    pub from: Option<String>,
    /// Message text (trigger calls).
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub group: bool,
}

/// The immediate answer to a poll call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReply {
    pub token: String,
    pub finished: bool,
    pub content: String,
}

impl PollReply {
    fn pending(token: String) -> Self {
        Self {
            token,
            finished: false,
            content: String::new(),
        }
    }

    fn finished(token: String, content: String) -> Self {
        Self {
            token,
            finished: true,
            content,
        }
    }
}

/// Per-key poll state machines over a shared reply engine.
pub struct PollBridge {
    engine: Arc<ReplyEngine>,
    multiplexer: Arc<Multiplexer>,
    sessions: DashMap<String, Arc<SessionHandle>>,
    /// Backend conversation continuation per key.
    conversations: DashMap<String, String>,
    /// Accepted external request ids with their accept time.
    seen_requests: DashMap<String, Instant>,
    dedup_ttl: Duration,
    triggers_seen: AtomicU64,
}

impl PollBridge {
    #[must_use]
    pub fn new(
        engine: Arc<ReplyEngine>,
        multiplexer: Arc<Multiplexer>,
        cfg: &PollBridgeConfig,
    ) -> Self {
        Self {
            engine,
            multiplexer,
            sessions: DashMap::new(),
            conversations: DashMap::new(),
            seen_requests: DashMap::new(),
            dedup_ttl: Duration::from_secs(cfg.dedup_ttl_secs),
            triggers_seen: AtomicU64::new(0),
        }
    }

    /// Answer one inbound relay call from current state. Never suspends.
    pub fn handle(self: &Arc<Self>, request: PollRequest) -> PollReply {
        if request.refresh {
            self.refresh(&request.conversation_key, request.token.as_deref())
        } else {
            self.trigger(request)
        }
    }

    /// Handle a new-message trigger.
    fn trigger(self: &Arc<Self>, request: PollRequest) -> PollReply {
        self.prune_dedup_if_needed();

        let key = request.conversation_key.clone();
        let session = self.session(&key);

        if self.seen_requests.contains_key(&request.request_id) {
            // Relay retry of a request we already accepted.
            if let Some((token, content)) = session.consume() {
                info!(key = %key, request_id = %request.request_id, "duplicate trigger served ready content");
                return PollReply::finished(token, content);
            }
            info!(key = %key, request_id = %request.request_id, "duplicate trigger ignored, job still running");
            return PollReply::pending(session.token());
        }
        self.seen_requests
            .insert(request.request_id.clone(), Instant::now());

        let token = new_token();
        if !session.begin(token.clone()) {
            // Another request id owns this key right now (single-flight).
            if let Some((token, content)) = session.consume() {
                warn!(key = %key, "trigger found undelivered ready content, serving it");
                return PollReply::finished(token, content);
            }
            info!(key = %key, "trigger while job running, not spawning another");
            return PollReply::pending(session.token());
        }

        let msg = InboundMessage {
            channel: "poll".into(),
            session_key: key.clone(),
            from: request.from.unwrap_or_else(|| "default".into()),
            sender_name: None,
            chat: if request.group {
                ChatKind::Group
            } else {
                ChatKind::Direct
            },
            body: request.body.unwrap_or_default(),
        };

        let bridge = Arc::clone(self);
        let job_session = Arc::clone(&session);
        tokio::spawn(async move {
            bridge.run_job(key, job_session, msg).await;
        });

        PollReply::pending(token)
    }

    /// Handle a poll/refresh call.
    fn refresh(&self, key: &str, token: Option<&str>) -> PollReply {
        let Some(session) = self.sessions.get(key).map(|entry| Arc::clone(&entry)) else {
            return PollReply::pending(token.unwrap_or_default().to_string());
        };

        if let Some(expected) = token
            && !expected.is_empty()
            && session.status() == PollStatus::Running
            && session.token() != expected
        {
            warn!(key, "refresh token does not match the issued stream token");
        }

        match session.consume() {
            Some((token, content)) => {
                info!(key, content_len = content.len(), "poll reply consumed");
                PollReply::finished(token, content)
            },
            None => PollReply::pending(session.token()),
        }
    }

    /// The background job: coordinator → multiplexer (poll buffer) → Ready.
    ///
    /// Failures are converted to an apology segment and the state still
    /// advances, so the polling caller always receives a terminal response.
    async fn run_job(&self, key: String, session: Arc<SessionHandle>, msg: InboundMessage) {
        let conversation_id = self
            .conversations
            .get(&key)
            .map(|entry| entry.value().clone());

        let (result, user_error) = self.engine.get_reply(&msg, conversation_id.as_deref()).await;

        match result {
            Some(result) => {
                self.conversations
                    .insert(key.clone(), result.conversation_id.clone());
                self.multiplexer.deliver_buffer(&result, session.as_ref());
            },
            None => {
                let text = user_error.unwrap_or_else(|| UNKNOWN_ERROR_REPLY.to_string());
                session.append(ReplySegment::text(text, 0));
            },
        }

        session.mark_ready();
        info!(key = %key, "poll job finished, reply ready");
    }

    fn session(&self, key: &str) -> Arc<SessionHandle> {
        self.sessions
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(SessionHandle::new()))
            .clone()
    }

    /// Drop dedup records older than the TTL. Piggybacks on trigger handling
    /// so the set stays bounded without a dedicated sweeper.
    fn prune_dedup_if_needed(&self) {
        let seen = self.triggers_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if !seen.is_multiple_of(PRUNE_EVERY_TRIGGERS) {
            return;
        }
        let ttl = self.dedup_ttl;
        let now = Instant::now();
        self.seen_requests
            .retain(|_, accepted_at| now.duration_since(*accepted_at) <= ttl);
    }
}

/// Opaque 10-char alphanumeric stream token.
fn new_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use {async_trait::async_trait, tokio_util::sync::CancellationToken};

    use courier_backend::{
        BackendInvoker, BackendResponse, BlockingAnswer, InvokeRequest, MarkdownExtractor,
        Result as BackendResult,
    };
    use courier_config::{BackendConfig, DeliveryConfig};
    use courier_reply::Coordinator;

    use super::*;

    /// Answers after a short delay so tests can observe the Running state.
    struct DelayedInvoker {
        calls: AtomicUsize,
        delay: Duration,
        answer: &'static str,
    }

    #[async_trait]
    impl BackendInvoker for DelayedInvoker {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            _cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(BackendResponse::Answer(BlockingAnswer {
                answer: self.answer.into(),
                conversation_id: "c1".into(),
            }))
        }
    }

    struct FailingInvoker;

    #[async_trait]
    impl BackendInvoker for FailingInvoker {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            _cancel: &CancellationToken,
        ) -> BackendResult<BackendResponse> {
            Err(courier_backend::Error::protocol("stream fell apart"))
        }
    }

    fn bridge_with(invoker: Arc<dyn BackendInvoker>) -> Arc<PollBridge> {
        let coordinator = Arc::new(Coordinator::new(
            invoker,
            Arc::new(MarkdownExtractor::new()),
            4,
        ));
        let engine = Arc::new(ReplyEngine::new(coordinator, BackendConfig::default()));
        let multiplexer = Arc::new(Multiplexer::new(&DeliveryConfig {
            max_message_bytes: 2048,
            part_delay_ms: 0,
        }));
        Arc::new(PollBridge::new(
            engine,
            multiplexer,
            &PollBridgeConfig::default(),
        ))
    }

    fn trigger(request_id: &str, key: &str, body: &str) -> PollRequest {
        PollRequest {
            request_id: request_id.into(),
            conversation_key: key.into(),
            refresh: false,
            token: None,
            from: Some("u1".into()),
            body: Some(body.into()),
            group: false,
        }
    }

    fn refresh(key: &str, token: &str) -> PollRequest {
        PollRequest {
            request_id: format!("poll-{token}"),
            conversation_key: key.into(),
            refresh: true,
            token: Some(token.into()),
            from: None,
            body: None,
            group: false,
        }
    }

    /// Poll until the bridge reports a finished reply.
    async fn poll_until_finished(bridge: &Arc<PollBridge>, key: &str, token: &str) -> PollReply {
        for _ in 0..200 {
            let reply = bridge.handle(refresh(key, token));
            if reply.finished {
                return reply;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("poll never finished for key {key}");
    }

    #[tokio::test]
    async fn lifecycle_trigger_poll_consume_idle() {
        let bridge = bridge_with(Arc::new(DelayedInvoker {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(30),
            answer: "Done",
        }));

        // Trigger answers immediately with an unfinished frame.
        let first = bridge.handle(trigger("r1", "k1", "hi"));
        assert!(!first.finished);
        assert!(first.content.is_empty());
        assert!(!first.token.is_empty());

        // An immediate poll still reports unfinished.
        let early = bridge.handle(refresh("k1", &first.token));
        assert!(!early.finished);

        // The background job completes and exactly one poll gets the content.
        let done = poll_until_finished(&bridge, "k1", &first.token).await;
        assert_eq!(done.content, "Done");

        // The key is back at Idle — no stale replay.
        let after = bridge.handle(refresh("k1", &first.token));
        assert!(!after.finished);
        assert!(after.content.is_empty());
    }

    #[tokio::test]
    async fn concurrent_triggers_spawn_one_job() {
        let invoker = Arc::new(DelayedInvoker {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            answer: "solo",
        });
        let bridge = bridge_with(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        let first = bridge.handle(trigger("r1", "k1", "hi"));
        let second = bridge.handle(trigger("r2", "k1", "hi again"));

        assert!(!first.finished);
        assert!(!second.finished);
        // The overlapping trigger reuses the running job's token.
        assert_eq!(second.token, first.token);

        poll_until_finished(&bridge, "k1", &first.token).await;
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_request_id_never_respawns() {
        let invoker = Arc::new(DelayedInvoker {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(40),
            answer: "once",
        });
        let bridge = bridge_with(Arc::clone(&invoker) as Arc<dyn BackendInvoker>);

        bridge.handle(trigger("r1", "k1", "hi"));
        // The relay retries the same request id while the job runs.
        let dup = bridge.handle(trigger("r1", "k1", "hi"));
        assert!(!dup.finished);

        tokio::time::sleep(Duration::from_millis(120)).await;
        // Retried again once the reply is ready: served without recompute.
        let dup_ready = bridge.handle(trigger("r1", "k1", "hi"));
        assert!(dup_ready.finished);
        assert_eq!(dup_ready.content, "once");
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_job_still_reaches_ready_with_apology() {
        let bridge = bridge_with(Arc::new(FailingInvoker));

        let first = bridge.handle(trigger("r1", "k1", "hi"));
        let done = poll_until_finished(&bridge, "k1", &first.token).await;

        assert!(done.finished);
        assert_eq!(done.content, UNKNOWN_ERROR_REPLY);
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let bridge = bridge_with(Arc::new(DelayedInvoker {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
            answer: "per-key",
        }));

        let a = bridge.handle(trigger("r1", "k1", "one"));
        let b = bridge.handle(trigger("r2", "k2", "two"));
        assert_ne!(a.token, b.token);

        let done_a = poll_until_finished(&bridge, "k1", &a.token).await;
        let done_b = poll_until_finished(&bridge, "k2", &b.token).await;
        assert_eq!(done_a.content, "per-key");
        assert_eq!(done_b.content, "per-key");
    }
}
