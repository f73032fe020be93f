use std::error::Error as StdError;

/// Crate-wide result type for delivery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport refused or failed to carry the message.
    #[error("delivery transport error: {message}")]
    Transport { message: String },

    /// A media reference could not be fetched for delivery.
    #[error("media fetch failed: {url}: {message}")]
    MediaFetch { url: String, message: String },

    /// Wrapped source error from an external dependency.
    #[error("delivery failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn media_fetch(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::MediaFetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
