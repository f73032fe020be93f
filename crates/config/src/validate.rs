//! Startup validation.
//!
//! A deployment with no backend endpoint or credential cannot serve a single
//! request, so these are rejected before any channel starts.

use crate::{
    error::{Error, Result},
    schema::CourierConfig,
};

/// Validate a loaded configuration, failing fast on unusable settings.
pub fn validate(cfg: &CourierConfig) -> Result<()> {
    if cfg.backend.api_base.trim().is_empty() {
        return Err(Error::configuration("backend.api_base is empty"));
    }
    if !cfg.backend.api_base.starts_with("http://") && !cfg.backend.api_base.starts_with("https://")
    {
        return Err(Error::configuration(format!(
            "backend.api_base is not an HTTP(S) URL: {}",
            cfg.backend.api_base
        )));
    }
    if cfg.backend.api_key.is_none() {
        return Err(Error::configuration(
            "backend.api_key is missing — set it in the config file or via ${ENV_VAR} substitution",
        ));
    }
    if cfg.backend.max_workers == 0 {
        return Err(Error::configuration("backend.max_workers must be at least 1"));
    }
    if cfg.delivery.max_message_bytes < 16 {
        return Err(Error::configuration(
            "delivery.max_message_bytes is too small to carry a split prefix",
        ));
    }
    Ok(())
}
