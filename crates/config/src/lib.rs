//! Configuration loading, env substitution, and startup validation.
//!
//! Config files: `courier.toml` or `courier.json`, searched in `./` then
//! `~/.config/courier/`. Supports `${ENV_VAR}` substitution in all string
//! values. Validation fails fast at startup — a missing backend endpoint or
//! credential is a [`Error::Configuration`] before any request is served.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, load_config},
    schema::{AppMode, BackendConfig, CourierConfig, DeliveryConfig, PollBridgeConfig},
    validate::validate,
};
