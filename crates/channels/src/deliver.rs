//! The delivery multiplexer: fan aggregated segments out to a channel.
//!
//! Push mode sends every segment but the last through a per-recipient
//! ordered send queue and hands the last one back to the caller as the
//! primary reply. Poll-buffer mode appends segments to the key's buffer
//! instead of transmitting them.

use std::{sync::Arc, time::Duration};

use {
    dashmap::DashMap,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use {
    courier_common::types::{AggregationResult, ReplySegment, SegmentKind},
    courier_config::DeliveryConfig,
};

use crate::{
    error::Result,
    fetch::{MediaFetcher, filename_for, is_downloadable},
    plugin::{DeliverySink, OutboundMedia, SegmentSink},
    split::split_numbered,
};

/// Fans ordered segments out to a sink or a poll buffer.
pub struct Multiplexer {
    /// One send lock per recipient keeps transmission sequential even though
    /// dispatch is concurrent.
    send_locks: DashMap<String, Arc<Mutex<()>>>,
    fetcher: Option<Arc<MediaFetcher>>,
    max_message_bytes: usize,
    part_delay: Duration,
}

impl Multiplexer {
    #[must_use]
    pub fn new(cfg: &DeliveryConfig) -> Self {
        Self {
            send_locks: DashMap::new(),
            fetcher: None,
            max_message_bytes: cfg.max_message_bytes,
            part_delay: Duration::from_millis(cfg.part_delay_ms),
        }
    }

    /// Attach a media fetcher so image/file segments are delivered as bytes
    /// where possible.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<MediaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    fn send_lock(&self, recipient: &str) -> Arc<Mutex<()>> {
        self.send_locks
            .entry(recipient.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Push delivery: segments `[0..n-1)` go out asynchronously in order;
    /// the last segment is returned as the primary reply.
    pub async fn deliver_push(
        &self,
        result: &AggregationResult,
        sink: Arc<dyn DeliverySink>,
        recipient: &str,
    ) -> Option<ReplySegment> {
        let (rest, primary) = result.split_primary()?;

        if !rest.is_empty() {
            info!(
                recipient,
                count = rest.len(),
                "dispatching leading segments"
            );

            let segments = rest.to_vec();
            let lock = self.send_lock(recipient);
            let fetcher = self.fetcher.clone();
            let recipient = recipient.to_string();
            let max_len = self.max_message_bytes;
            let part_delay = self.part_delay;

            tokio::spawn(async move {
                let _guard = lock.lock().await;
                for segment in segments {
                    if let Err(e) = send_segment(
                        sink.as_ref(),
                        &recipient,
                        &segment,
                        fetcher.as_deref(),
                        max_len,
                        part_delay,
                    )
                    .await
                    {
                        warn!(recipient = %recipient, sequence = segment.sequence, error = %e, "segment send failed");
                    }
                }
            });
        }

        Some(primary.clone())
    }

    /// Poll-buffer delivery: append segments in order; media the polling
    /// transport cannot carry is dropped with a logged degradation.
    pub fn deliver_buffer(&self, result: &AggregationResult, buffer: &dyn SegmentSink) {
        for segment in &result.segments {
            match segment.kind {
                SegmentKind::Text => buffer.append(segment.clone()),
                SegmentKind::Image | SegmentKind::File => {
                    warn!(
                        sequence = segment.sequence,
                        kind = ?segment.kind,
                        "dropping media segment unsupported by the polling transport"
                    );
                },
            }
        }
    }

    /// Send one segment directly (used for the primary reply on push
    /// channels).
    pub async fn send_primary(
        &self,
        sink: &dyn DeliverySink,
        recipient: &str,
        segment: &ReplySegment,
    ) -> Result<()> {
        send_segment(
            sink,
            recipient,
            segment,
            self.fetcher.as_deref(),
            self.max_message_bytes,
            self.part_delay,
        )
        .await
    }
}

/// Transmit one segment: text is split into paced, numbered parts; media is
/// fetched and re-uploaded where possible, degrading to a plain link.
async fn send_segment(
    sink: &dyn DeliverySink,
    recipient: &str,
    segment: &ReplySegment,
    fetcher: Option<&MediaFetcher>,
    max_len: usize,
    part_delay: Duration,
) -> Result<()> {
    match segment.kind {
        SegmentKind::Text => {
            let parts = split_numbered(&segment.value, max_len);
            if parts.len() > 1 {
                info!(recipient, parts = parts.len(), "text over transport cap, split");
            }
            let last = parts.len().saturating_sub(1);
            for (i, part) in parts.iter().enumerate() {
                sink.send_text(recipient, part).await?;
                if i < last {
                    tokio::time::sleep(part_delay).await;
                }
            }
            Ok(())
        },
        SegmentKind::Image | SegmentKind::File => {
            let url = segment.value.as_str();
            if !is_downloadable(url) {
                debug!(recipient, url, "media not downloadable, sending link");
                return sink.send_text(recipient, url).await;
            }
            match fetcher {
                Some(fetcher) => match fetcher.fetch(url).await {
                    Ok(data) => {
                        sink.send_media(
                            recipient,
                            &OutboundMedia::Bytes {
                                data,
                                filename: filename_for(url),
                            },
                        )
                        .await
                    },
                    Err(e) => {
                        warn!(recipient, url, error = %e, "media fetch failed, degrading to link");
                        sink.send_text(recipient, url).await
                    },
                },
                None => {
                    sink.send_media(recipient, &OutboundMedia::Url(url.to_string()))
                        .await
                },
            }
        },
    }
}
