//! Backend invocation contract and response aggregation.
//!
//! One polymorphic [`BackendInvoker`] covers the three response shapes the
//! backend can produce (blocking answer, incremental event stream, workflow
//! run); the aggregator turns either shape into an ordered list of typed
//! reply segments plus a conversation identifier.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod extract;
pub mod invoke;

pub use {
    aggregate::{aggregate, aggregate_blocking, aggregate_stream},
    error::{Error, Result},
    event::{BackendEvent, MediaKind},
    extract::{ContentExtractor, ExtractedSpan, MarkdownExtractor, strip_markdown},
    invoke::{BackendInvoker, BackendResponse, BlockingAnswer, EventStream, InvokeMode, InvokeRequest},
};
