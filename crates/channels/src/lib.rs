//! Delivery traits and the outbound multiplexer.
//!
//! Channels implement [`DeliverySink`]; the multiplexer fans aggregated
//! segments out to a sink (push channels) or into a poll buffer (channels
//! restricted to synchronous polling), preserving segment order either way.

pub mod deliver;
pub mod error;
pub mod fetch;
pub mod plugin;
pub mod split;

pub use {
    deliver::Multiplexer,
    error::{Error, Result},
    fetch::{MediaFetcher, is_downloadable},
    plugin::{DeliverySink, OutboundMedia, SegmentSink},
    split::{split_by_utf8_length, split_numbered},
};
