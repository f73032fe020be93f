use thiserror::Error;

use courier_common::FromMessage;

/// Fixed user-facing text for failures that exhausted their handling budget.
pub const UNKNOWN_ERROR_REPLY: &str =
    "I ran into a problem just now — please try again in a moment.";

/// Fixed apology for content-policy rejections that survived query mutation.
pub const CONTENT_POLICY_REPLY: &str =
    "Sorry — I see what you mean, but I need it phrased a little more gently.";

/// Reply for a backend that legitimately answered with nothing.
pub const EMPTY_ANSWER_REPLY: &str =
    "Sorry, I can't answer that right now. Please try again later.";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] courier_backend::Error),

    /// The coordinator's bounded wait expired; the job may still finish.
    #[error("request still running after {timeout_secs}s")]
    StillWorking { timeout_secs: u64 },

    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Every terminal failure converges to a textual reply; nothing upstream
    /// leaks to the delivery or polling boundary.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(e) if e.is_content_policy() => CONTENT_POLICY_REPLY.to_string(),
            Self::Backend(_) | Self::Message(_) => UNKNOWN_ERROR_REPLY.to_string(),
            Self::StillWorking { timeout_secs } => format!(
                "Still working on it — this is taking longer than {timeout_secs}s. \
                 Please ask again in a moment, or simplify the question."
            ),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

courier_common::impl_context!();
