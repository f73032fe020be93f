use {async_trait::async_trait, bytes::Bytes};

use courier_common::types::ReplySegment;

use crate::error::Result;

/// Media ready for outbound delivery.
#[derive(Debug, Clone)]
pub enum OutboundMedia {
    /// Fetched payload, delivered as bytes.
    Bytes { data: Bytes, filename: String },
    /// Reference delivered as-is; the transport resolves it.
    Url(String),
}

/// Send messages to a delivery channel. Each messaging platform implements
/// this.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;

    async fn send_media(&self, recipient: &str, media: &OutboundMedia) -> Result<()>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _recipient: &str) -> Result<()> {
        Ok(())
    }
}

/// Ordered segment buffer for channels restricted to synchronous polling.
///
/// Append must preserve call order; the poll bridge guarantees a single
/// writer per key.
pub trait SegmentSink: Send + Sync {
    fn append(&self, segment: ReplySegment);
}
