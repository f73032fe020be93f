//! Per-conversation-key poll state.
//!
//! Status only moves forward: Idle → Running → Ready → Consumed, then the
//! terminal clear back to Idle. The segment buffer is appended only by the
//! single background job owning the key, so append order is receipt order.

use std::sync::Mutex;

use tracing::warn;

use {
    courier_backend::strip_markdown,
    courier_channels::SegmentSink,
    courier_common::types::{ReplySegment, SegmentKind},
};

/// Lifecycle of one conversation key on the poll bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollStatus {
    /// No job pending; a new trigger may start one.
    #[default]
    Idle,
    /// A background job is producing the reply.
    Running,
    /// The reply is buffered and waiting to be consumed.
    Ready,
    /// The reply was handed out; cleared back to Idle immediately.
    Consumed,
}

impl PollStatus {
    /// Whether `next` is a legal forward transition from `self`.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Ready)
                | (Self::Ready, Self::Consumed)
                | (Self::Consumed, Self::Idle)
        )
    }
}

#[derive(Debug, Default)]
struct PollSession {
    status: PollStatus,
    buffer: Vec<ReplySegment>,
    token: String,
}

/// Shared handle to one key's poll session.
#[derive(Debug, Default)]
pub struct SessionHandle {
    inner: Mutex<PollSession>,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(&self) -> PollStatus {
        self.lock().status
    }

    /// The currently issued stream token (empty when Idle).
    #[must_use]
    pub fn token(&self) -> String {
        self.lock().token.clone()
    }

    /// Idle → Running with a fresh token. Returns `false` (and changes
    /// nothing) when the key is not Idle — the single-flight guard.
    #[must_use]
    pub fn begin(&self, token: String) -> bool {
        let mut session = self.lock();
        if session.status != PollStatus::Idle {
            return false;
        }
        session.status = PollStatus::Running;
        session.buffer.clear();
        session.token = token;
        true
    }

    /// Running → Ready. A no-op from any other state.
    pub fn mark_ready(&self) {
        let mut session = self.lock();
        if session.status == PollStatus::Running {
            session.status = PollStatus::Ready;
        } else {
            warn!(status = ?session.status, "mark_ready outside Running ignored");
        }
    }

    /// Consume a Ready reply exactly once: merge buffered text segments in
    /// order into one string, advance Ready → Consumed, and clear the key
    /// back to Idle. Returns `(token, merged)` or `None` when not Ready.
    #[must_use]
    pub fn consume(&self) -> Option<(String, String)> {
        let mut session = self.lock();
        if session.status != PollStatus::Ready {
            return None;
        }

        let merged = session
            .buffer
            .iter()
            .filter(|s| s.kind == SegmentKind::Text)
            .map(|s| s.value.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let token = std::mem::take(&mut session.token);

        session.status = PollStatus::Consumed;
        // Terminal clear: the key is immediately reusable.
        session.status = PollStatus::Idle;
        session.buffer.clear();

        Some((token, merged))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PollSession> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SegmentSink for SessionHandle {
    fn append(&self, segment: ReplySegment) {
        let mut session = self.lock();
        let segment = if segment.kind == SegmentKind::Text {
            ReplySegment {
                value: strip_markdown(&segment.value),
                ..segment
            }
        } else {
            segment
        };
        session.buffer.push(segment);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_advances_forward() {
        assert!(PollStatus::Idle.can_advance_to(PollStatus::Running));
        assert!(PollStatus::Running.can_advance_to(PollStatus::Ready));
        assert!(PollStatus::Ready.can_advance_to(PollStatus::Consumed));
        assert!(PollStatus::Consumed.can_advance_to(PollStatus::Idle));

        assert!(!PollStatus::Running.can_advance_to(PollStatus::Idle));
        assert!(!PollStatus::Ready.can_advance_to(PollStatus::Running));
        assert!(!PollStatus::Idle.can_advance_to(PollStatus::Ready));
    }

    #[test]
    fn begin_is_single_flight() {
        let session = SessionHandle::new();
        assert!(session.begin("t1".into()));
        assert!(!session.begin("t2".into()));
        assert_eq!(session.token(), "t1");
    }

    #[test]
    fn consume_merges_in_order_and_clears() {
        let session = SessionHandle::new();
        assert!(session.begin("t1".into()));
        session.append(ReplySegment::text("first", 0));
        session.append(ReplySegment::text("second", 1));
        session.mark_ready();

        let (token, merged) = session.consume().unwrap();
        assert_eq!(token, "t1");
        assert_eq!(merged, "first\n\nsecond");

        // Exactly once: the key is back at Idle with nothing to replay.
        assert_eq!(session.status(), PollStatus::Idle);
        assert!(session.consume().is_none());
        assert!(session.token().is_empty());
    }

    #[test]
    fn consume_before_ready_returns_none() {
        let session = SessionHandle::new();
        assert!(session.begin("t1".into()));
        assert!(session.consume().is_none());
    }

    #[test]
    fn append_strips_markdown_from_text() {
        let session = SessionHandle::new();
        assert!(session.begin("t1".into()));
        session.append(ReplySegment::text("**bold** move", 0));
        session.mark_ready();

        let (_, merged) = session.consume().unwrap();
        assert_eq!(merged, "bold move");
    }
}
