//! Config schema types (backend, delivery, poll bridge).

use {
    secrecy::SecretString,
    serde::{Deserialize, Serialize},
};

/// Which application shape the backend exposes for this deployment.
///
/// `Chatbot` and `Chatflow` answer with a single blocking response, `Agent`
/// streams incremental events, `Workflow` runs a workflow and returns its
/// output text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    #[default]
    Chatbot,
    Chatflow,
    Agent,
    Workflow,
}

impl AppMode {
    /// Stable string form, used in cache keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chatbot => "chatbot",
            Self::Chatflow => "chatflow",
            Self::Agent => "agent",
            Self::Workflow => "workflow",
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub backend: BackendConfig,
    pub delivery: DeliveryConfig,
    pub poll_bridge: PollBridgeConfig,
}

/// Conversational-AI backend connection and tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend API. Required; there is no usable default.
    pub api_base: String,
    /// API credential. Supplied via `${ENV_VAR}` substitution in practice.
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,
    pub mode: AppMode,
    /// Per-request wall-clock budget for the coordinator's bounded wait.
    pub timeout_secs: u64,
    /// Elevated budget for queries matching the image/chart keyword set.
    pub image_timeout_secs: u64,
    /// Bounded worker pool size for backend calls and outbound sends.
    pub max_workers: usize,
    pub max_retries: u32,
    /// Base delay for the exponential backoff between retry attempts.
    pub retry_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: None,
            mode: AppMode::default(),
            timeout_secs: 120,
            image_timeout_secs: 180,
            max_workers: 10,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Outbound delivery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum UTF-8 byte length of one outbound text message.
    pub max_message_bytes: usize,
    /// Pacing delay between numbered parts of a split message.
    pub part_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 2048,
            part_delay_ms: 800,
        }
    }
}

/// Poll-bridge webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollBridgeConfig {
    pub bind: String,
    pub port: u16,
    /// How long an accepted external request id is remembered for dedup.
    pub dedup_ttl_secs: u64,
}

impl Default for PollBridgeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 9899,
            dedup_ttl_secs: 600,
        }
    }
}
