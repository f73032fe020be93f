//! Core data model shared by the aggregation, delivery, and poll-bridge crates.

use serde::{Deserialize, Serialize};

/// What kind of content a reply segment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    /// An image reference (URL or backend file path).
    Image,
    /// A non-image file reference.
    File,
}

/// One ordered, typed unit of a reply.
///
/// Segments are produced in strict receipt order; `sequence` records that
/// order and must survive all downstream processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySegment {
    pub kind: SegmentKind,
    pub value: String,
    pub sequence: usize,
}

impl ReplySegment {
    #[must_use]
    pub fn text(value: impl Into<String>, sequence: usize) -> Self {
        Self {
            kind: SegmentKind::Text,
            value: value.into(),
            sequence,
        }
    }

    #[must_use]
    pub fn image(value: impl Into<String>, sequence: usize) -> Self {
        Self {
            kind: SegmentKind::Image,
            value: value.into(),
            sequence,
        }
    }

    #[must_use]
    pub fn file(value: impl Into<String>, sequence: usize) -> Self {
        Self {
            kind: SegmentKind::File,
            value: value.into(),
            sequence,
        }
    }

    /// Whether this segment is plain text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.kind == SegmentKind::Text
    }
}

/// The outcome of aggregating one backend response or event stream.
///
/// Immutable once returned: segments are in receipt order and the
/// conversation id has been observed at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub segments: Vec<ReplySegment>,
    pub conversation_id: String,
    /// `true` when the source reached its terminal event.
    pub is_final: bool,
}

impl AggregationResult {
    /// Split off the primary (last) segment from the ones that are fanned
    /// out asynchronously. Returns `None` when there are no segments.
    #[must_use]
    pub fn split_primary(&self) -> Option<(&[ReplySegment], &ReplySegment)> {
        let (last, rest) = self.segments.split_last()?;
        Some((rest, last))
    }
}

/// Whether a message arrived in a direct chat or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Group,
}

/// Normalized inbound message context, independent of the channel that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel identifier (e.g. "push", "poll").
    pub channel: String,
    /// Conversation key — the group id for group chats, the peer id otherwise.
    pub session_key: String,
    /// Sender identifier.
    pub from: String,
    pub sender_name: Option<String>,
    pub chat: ChatKind,
    pub body: String,
}

impl InboundMessage {
    /// The query text handed to the backend.
    ///
    /// Group messages get a sender signature appended so the backend knows
    /// who is speaking inside the shared conversation thread.
    #[must_use]
    pub fn attributed_body(&self) -> String {
        match self.chat {
            ChatKind::Group => format!("{}\n\nfrom {}", self.body, self.from),
            ChatKind::Direct => self.body.clone(),
        }
    }
}
