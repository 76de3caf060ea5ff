use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// JSON extraction and decision parsing for raw LLM replies.
pub mod parser;

/// Per-decision validation against the trading rules and the portfolio.
pub mod validate;

pub use parser::parse_decisions;
pub use validate::validate_decision;

/// What the LLM decided to do.
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
pub enum DecisionType {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
    #[display("hold")]
    Hold,
    #[display("wait")]
    Wait,
}

impl DecisionType {
    /// Whether the decision trades, requiring a stock code and quantity.
    pub fn is_trade(&self) -> bool {
        matches!(self, Self::Buy | Self::Sell)
    }
}

/// One trading decision extracted from an LLM reply.
///
/// Transient: decisions are validated and turned into orders within the same
/// cycle, never persisted. The stock code is kept as the raw (suffix
/// stripped) string; validation parses it into a checked code.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct TradingDecision {
    pub decision: DecisionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TradingDecision {
    /// The implicit decision used when the LLM returns an empty array.
    pub fn empty_reply_hold() -> Self {
        Self {
            decision: DecisionType::Hold,
            stock_code: None,
            quantity: None,
            price: None,
            reason: Some("model returned an empty decision list".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decision_serde_round_trip() {
        let decision = TradingDecision {
            decision: DecisionType::Buy,
            stock_code: Some("600000".to_string()),
            quantity: Some(100),
            price: Some(dec!(10.5)),
            reason: Some("momentum".to_string()),
        };

        let json = serde_json::to_string(&decision).unwrap();
        let reparsed = serde_json::from_str::<TradingDecision>(&json).unwrap();
        assert_eq!(reparsed, decision);
    }

    #[test]
    fn test_hold_serializes_without_trade_fields() {
        let json = serde_json::to_value(TradingDecision::empty_reply_hold()).unwrap();
        assert_eq!(json["decision"], "hold");
        assert!(json.get("stock_code").is_none());
        assert!(json.get("quantity").is_none());
    }
}
