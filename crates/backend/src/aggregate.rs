//! Response aggregation: one backend response or event stream in, ordered
//! typed reply segments out.

use {futures::StreamExt, tracing::warn};

use courier_common::types::{AggregationResult, ReplySegment};

use crate::{
    error::{Error, Result, classify_message},
    event::{BackendEvent, MediaKind},
    extract::ContentExtractor,
    invoke::{BackendResponse, BlockingAnswer, EventStream},
};

/// Aggregate either response shape into an [`AggregationResult`].
pub async fn aggregate(
    response: BackendResponse,
    extractor: &dyn ContentExtractor,
) -> Result<AggregationResult> {
    match response {
        BackendResponse::Answer(answer) => aggregate_blocking(answer, extractor),
        BackendResponse::Stream(events) => aggregate_stream(events).await,
    }
}

/// Wrap a single structured answer into one result.
///
/// Segmentation of the answer text into text/image/file spans is delegated
/// to the content extractor.
pub fn aggregate_blocking(
    answer: BlockingAnswer,
    extractor: &dyn ContentExtractor,
) -> Result<AggregationResult> {
    if answer.conversation_id.is_empty() {
        return Err(Error::protocol("blocking answer without conversation id"));
    }

    let segments = extractor
        .extract(&answer.answer)
        .into_iter()
        .enumerate()
        .map(|(sequence, span)| ReplySegment {
            kind: span.kind,
            value: span.value,
            sequence,
        })
        .collect();

    Ok(AggregationResult {
        segments,
        conversation_id: answer.conversation_id,
        is_final: true,
    })
}

/// Run the aggregation state machine over an event stream.
///
/// Incremental text accumulates into a buffer; a boundary event (media
/// attachment, thought marker) flushes the buffer as one Text segment and
/// appends the boundary's own segment in place, so media is never deferred
/// to the end. An error event aborts the whole aggregation — no partial
/// result is returned. The conversation id must be observed at least once.
pub async fn aggregate_stream(mut events: EventStream) -> Result<AggregationResult> {
    let mut segments: Vec<ReplySegment> = Vec::new();
    let mut buffer = String::new();
    let mut conversation_id: Option<String> = None;
    let mut saw_end = false;

    while let Some(event) = events.next().await {
        if conversation_id.is_none()
            && let Some(id) = event.conversation_id()
        {
            conversation_id = Some(id.to_string());
        }

        match event {
            BackendEvent::Message { text, .. } => buffer.push_str(&text),
            BackendEvent::Thought { .. } => flush_text(&mut buffer, &mut segments),
            BackendEvent::MediaAttachment { kind, url, .. } => {
                flush_text(&mut buffer, &mut segments);
                let sequence = segments.len();
                segments.push(match kind {
                    MediaKind::Image => ReplySegment::image(url, sequence),
                    MediaKind::File => ReplySegment::file(url, sequence),
                });
            },
            BackendEvent::Error { message } => return Err(classify_message(&message)),
            BackendEvent::End { .. } => {
                flush_text(&mut buffer, &mut segments);
                saw_end = true;
                break;
            },
            BackendEvent::Unknown => {
                warn!("skipping unrecognized backend event");
            },
        }
    }

    if !saw_end {
        // Stream exhausted without a terminal event; keep what accumulated.
        flush_text(&mut buffer, &mut segments);
    }

    let conversation_id = conversation_id
        .ok_or_else(|| Error::protocol("no conversation id observed in event stream"))?;

    Ok(AggregationResult {
        segments,
        conversation_id,
        is_final: saw_end,
    })
}

/// Flush the accumulated text buffer as one Text segment. Empty buffers are
/// skipped.
fn flush_text(buffer: &mut String, segments: &mut Vec<ReplySegment>) {
    if buffer.is_empty() {
        return;
    }
    let sequence = segments.len();
    segments.push(ReplySegment::text(std::mem::take(buffer), sequence));
}
