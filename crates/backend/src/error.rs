use thiserror::Error;

/// Crate-wide result type for backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed backend errors.
///
/// The distinction drives retry behavior: transport failures are retried per
/// policy, content-policy rejections go through query mutation instead, and
/// protocol errors are fatal to the current request only — never retried,
/// never cached.
#[derive(Debug, Error)]
pub enum Error {
    /// Network/timeout-class failure talking to the backend.
    #[error("backend transport error: {message}")]
    Transport { message: String },

    /// The backend's content filter rejected the query.
    #[error("backend rejected the query: {message}")]
    UpstreamRejection { message: String },

    /// Malformed or incomplete event stream (e.g. missing conversation id).
    #[error("backend protocol error: {message}")]
    Protocol { message: String },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn upstream_rejection(message: impl std::fmt::Display) -> Self {
        Self::UpstreamRejection {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }

    /// Whether the retry loop may re-attempt after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether this is a content-policy rejection eligible for query mutation.
    #[must_use]
    pub fn is_content_policy(&self) -> bool {
        matches!(self, Self::UpstreamRejection { .. })
    }
}

/// Message patterns signalling a content-filter rejection.
const CONTENT_POLICY_PATTERNS: &[&str] = &[
    "content management policy",
    "content_filter",
    "content policy",
    "responsibleaipolicyviolation",
];

/// Message patterns signalling a transport-class failure.
const TRANSPORT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "connect error",
    "reset by peer",
    "500",
    "502",
    "503",
    "504",
    "service unavailable",
    "bad gateway",
    "overloaded",
];

/// Classify a raw error message from an invoker into the taxonomy.
///
/// Same message-pattern approach the upstream APIs force on every client:
/// the body is free text, so classification is substring matching.
#[must_use]
pub fn classify_message(message: &str) -> Error {
    let lower = message.to_lowercase();
    if CONTENT_POLICY_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Error::upstream_rejection(message);
    }
    if TRANSPORT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Error::transport(message);
    }
    Error::protocol(message)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_content_policy() {
        let err = classify_message(
            "azure_openai: the response was filtered due to the prompt triggering the content management policy",
        );
        assert!(err.is_content_policy());
        assert!(!err.is_retryable());
    }

    #[test]
    fn classify_transport() {
        assert!(classify_message("connection reset by peer").is_retryable());
        assert!(classify_message("503 Service Unavailable").is_retryable());
        assert!(classify_message("request timed out").is_retryable());
    }

    #[test]
    fn classify_unknown_is_protocol() {
        let err = classify_message("unexpected token in event payload");
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(!err.is_retryable());
    }
}
