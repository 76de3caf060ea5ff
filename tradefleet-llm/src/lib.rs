//! # Tradefleet-LLM
//! Uniform chat interface over three LLM wire dialects:
//!
//! | Protocol | Endpoint | Auth |
//! |----------|----------|------|
//! | `openai` | `POST {base_url}/chat/completions` | `Authorization: Bearer` |
//! | `anthropic` | `POST {base_url}/v1/messages` | `x-api-key` + `anthropic-version` |
//! | `google` | `POST {base_url}/models/{model}:generateContent` | `?key=` query parameter |
//!
//! Every round-trip, success or failure, emits exactly one [`LlmLog`](log::LlmLog)
//! through the configured [`LlmLogSink`](log::LlmLogSink). Retries are the
//! caller's responsibility; the client reports typed [`LlmError`](error::LlmError)s
//! and performs none itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Multi-protocol chat client implementation.
pub mod client;

/// Typed `LlmError` covering connection, timeout, rate-limit, HTTP and
/// response-parse failures.
pub mod error;

/// Per-call `LlmLog` records and the append-only sink contract.
pub mod log;

/// Provider model catalogue queries.
pub mod models;

/// Wire request/response types per dialect.
pub mod protocol;

pub use client::LlmClient;
pub use error::LlmError;
pub use log::{LlmCallStatus, LlmLog, LlmLogId, LlmLogSink};
pub use models::ModelInfo;

/// Default request timeout applied when a provider row does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default sampling temperature for dialects that require one on the wire.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Wire dialect spoken by a provider endpoint.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum LlmProtocol {
    #[display("openai")]
    OpenAi,
    #[display("anthropic")]
    Anthropic,
    #[display("google")]
    Google,
}

/// Role of a chat message.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[display("system")]
    System,
    #[display("user")]
    User,
    #[display("assistant")]
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, derive_more::Constructor)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content.into())
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content.into())
    }
}

/// Uniform chat request, independent of the wire dialect.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Overrides the provider's default model when set.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Attribution recorded on the emitted [`LlmLog`]; never sent on the wire.
    pub agent_id: Option<String>,
}

/// Uniform chat response, independent of the wire dialect.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// Token counts reported by the provider, where available.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, derive_more::Constructor)]
pub struct Usage {
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
}

/// Chat result together with the id of the [`LlmLog`](log::LlmLog) row the
/// call produced, for back-references from persisted orders.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChatOutcome {
    pub response: ChatResponse,
    pub log_id: Option<LlmLogId>,
}

/// Chat seam used by the decision pipeline, implemented by [`LlmClient`] and
/// by scripted mocks in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError>;
}

/// Configuration of one provider endpoint instance.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct LlmConfig {
    pub protocol: LlmProtocol,
    pub base_url: String,
    pub api_key: String,
    pub default_model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub provider_id: String,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base url with any trailing slash removed.
    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}
