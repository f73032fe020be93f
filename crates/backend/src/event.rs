//! Typed events yielded by a streaming backend invocation.

use serde::{Deserialize, Serialize};

/// What kind of media an attachment event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    File,
}

/// One event from the backend's incremental stream.
///
/// Every variant optionally carries the conversation identifier; the
/// aggregator requires it to appear at least once across the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackendEvent {
    /// Incremental answer text.
    Message {
        text: String,
        conversation_id: Option<String>,
    },
    /// Agent reasoning marker — a segment boundary, carries no content.
    Thought { conversation_id: Option<String> },
    /// A media attachment produced mid-answer.
    MediaAttachment {
        kind: MediaKind,
        url: String,
        conversation_id: Option<String>,
    },
    /// Terminal event.
    End { conversation_id: Option<String> },
    /// Upstream error — aborts the aggregation.
    Error { message: String },
    /// Any event kind this client does not recognize. Skipped, not fatal.
    #[serde(other)]
    Unknown,
}

impl BackendEvent {
    /// The conversation id carried by this event, if any.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Message {
                conversation_id, ..
            }
            | Self::Thought { conversation_id }
            | Self::MediaAttachment {
                conversation_id, ..
            }
            | Self::End { conversation_id } => conversation_id.as_deref(),
            Self::Error { .. } | Self::Unknown => None,
        }
    }
}
