//! Poll-bridge synchronizer.
//!
//! Adapter exposing an asynchronous reply job through repeated short
//! synchronous poll calls: one state machine per conversation key
//! (Idle → Running → Ready → Consumed), idempotent under duplicate and
//! overlapping triggers, with the relay protocol served over HTTP.

pub mod bridge;
pub mod state;
pub mod webhook;

pub use {
    bridge::{PollBridge, PollReply, PollRequest},
    state::{PollStatus, SessionHandle},
    webhook::router,
};
