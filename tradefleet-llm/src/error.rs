use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one LLM round-trip. The client performs no retries; callers
/// decide whether a variant is worth another attempt.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum LlmError {
    #[error("connection: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited (retry-after: {retry_after_secs:?}s)")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("http {status}: {body}")]
    Response { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Connection(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(LlmError::Timeout.to_string(), "request timed out");
        assert_eq!(
            LlmError::Response {
                status: 500,
                body: "oops".to_string()
            }
            .to_string(),
            "http 500: oops"
        );
    }
}
