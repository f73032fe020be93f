//! Request coordination — the pipeline between inbound messages and the
//! backend.
//!
//! Flow: inbound message → cache check → bounded worker pool → backend call
//! with retry/backoff and content-policy fallback → aggregation → memoize.

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod policy;
pub mod reply;

pub use {
    cache::{CacheKey, ResponseCache},
    coordinator::{Coordinator, Outcome},
    error::{
        CONTENT_POLICY_REPLY, EMPTY_ANSWER_REPLY, Error, Result, UNKNOWN_ERROR_REPLY,
    },
    policy::{RetryPolicy, resolve_policy},
    reply::ReplyEngine,
};
