//! Shared types, error definitions, and utilities used across all courier crates.

pub mod error;
pub mod types;

pub use error::{CourierError, Error, FromMessage, Result};
