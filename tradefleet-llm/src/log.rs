use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Monotonic identifier assigned by the sink on append.
pub type LlmLogId = i64;

/// Terminal status of one LLM round-trip.
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
pub enum LlmCallStatus {
    #[display("success")]
    Success,
    #[display("error")]
    Error,
}

/// Immutable record of one LLM round-trip, written exactly once per call.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct LlmLog {
    pub provider_id: String,
    pub model_name: String,
    pub agent_id: Option<String>,
    pub request_body: String,
    pub response_body: Option<String>,
    pub duration_ms: u64,
    pub status: LlmCallStatus,
    pub error_message: Option<String>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub request_time: DateTime<FixedOffset>,
}

/// Append-only sink for [`LlmLog`] records.
///
/// Implementations must tolerate concurrent appends; duplicate suppression is
/// not required. Records are never mutated after the append.
pub trait LlmLogSink: Send + Sync + std::fmt::Debug {
    /// Append one record, returning its assigned monotonic id.
    fn record(&self, log: LlmLog) -> LlmLogId;
}
