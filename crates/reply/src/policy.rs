//! Per-request retry policy resolution.

use std::time::Duration;

use courier_config::BackendConfig;

/// Queries matching these are assumed to trigger image/chart generation and
/// get the elevated timeout.
const IMAGE_KEYWORDS: &[&str] = &[
    "generate", "draw", "paint", "image", "picture", "poster", "chart", "diagram", "plot",
    "render",
];

/// Retry/timeout budget for one request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Bounded wait for the caller; the worker is only asked to cancel when
    /// it expires.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (zero-based): `base_delay * 2^attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Resolve the policy for a query from config, elevating the timeout for
/// image/chart-generation work.
#[must_use]
pub fn resolve_policy(cfg: &BackendConfig, query: &str) -> RetryPolicy {
    let lower = query.to_lowercase();
    let timeout_secs = if IMAGE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        cfg.image_timeout_secs
    } else {
        cfg.timeout_secs
    };

    RetryPolicy {
        max_attempts: cfg.max_retries.max(1),
        base_delay: Duration::from_millis(cfg.retry_delay_ms),
        timeout: Duration::from_secs(timeout_secs),
    }
}
