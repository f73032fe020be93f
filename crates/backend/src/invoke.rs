//! The backend invocation contract.
//!
//! The HTTP transport and payload shape live behind [`BackendInvoker`];
//! courier only depends on the response shapes. Cancellation is cooperative:
//! the coordinator cancels the token when its bounded wait expires, and an
//! invoker is expected to poll the token between I/O steps — the work is not
//! forcibly stopped, and a late result is still usable (stale-but-valid).

use std::pin::Pin;

use {async_trait::async_trait, futures::Stream, tokio_util::sync::CancellationToken};

use courier_config::AppMode;

use crate::{error::Result, event::BackendEvent};

/// Which invocation strategy to use for a request. Selected once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeMode {
    /// Single structured answer.
    Blocking,
    /// Incremental event stream.
    Streaming,
    /// Workflow run returning its output text.
    Workflow,
}

impl InvokeMode {
    /// Map the configured application shape onto an invocation strategy.
    #[must_use]
    pub fn from_app_mode(mode: AppMode) -> Self {
        match mode {
            AppMode::Chatbot | AppMode::Chatflow => Self::Blocking,
            AppMode::Agent => Self::Streaming,
            AppMode::Workflow => Self::Workflow,
        }
    }
}

/// One backend invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub query: String,
    /// End-user identifier forwarded to the backend.
    pub user: String,
    /// Existing conversation to continue, empty for a fresh one.
    pub conversation_id: Option<String>,
    pub mode: InvokeMode,
}

/// A single blocking answer (also what a workflow run resolves to).
#[derive(Debug, Clone)]
pub struct BlockingAnswer {
    pub answer: String,
    pub conversation_id: String,
}

/// Stream of typed backend events.
pub type EventStream = Pin<Box<dyn Stream<Item = BackendEvent> + Send>>;

/// Either response shape a backend call can produce.
pub enum BackendResponse {
    Answer(BlockingAnswer),
    Stream(EventStream),
}

/// Pluggable backend invocation.
///
/// Implementations own credentials, transport, and payload shape. The
/// `cancel` token must be polled between I/O steps; once cancelled the
/// invoker should return promptly with a transport error.
#[async_trait]
pub trait BackendInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: InvokeRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendResponse>;
}
