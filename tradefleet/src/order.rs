use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tradefleet_llm::LlmLogId;
use tradefleet_market::{Side, StockCode, TradingFees};
use uuid::Uuid;

/// Direction of a persisted order. Unlike [`Side`], a no-op `hold` decision
/// is persisted as an order too, with null code, quantity and price.
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
pub enum OrderSide {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
    #[display("hold")]
    Hold,
}

impl OrderSide {
    /// The tradeable side, `None` for hold orders.
    pub fn trade_side(&self) -> Option<Side> {
        match self {
            Self::Buy => Some(Side::Buy),
            Self::Sell => Some(Side::Sell),
            Self::Hold => None,
        }
    }
}

impl From<Side> for OrderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Self::Buy,
            Side::Sell => Self::Sell,
        }
    }
}

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
pub enum OrderStatus {
    #[display("pending")]
    Pending,
    #[display("filled")]
    Filled,
    #[display("rejected")]
    Rejected,
    #[display("cancelled")]
    Cancelled,
}

/// A persisted order produced by one decision cycle.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub agent_id: Uuid,
    /// Back-reference to the LLM call that produced this order.
    pub llm_log_id: Option<LlmLogId>,
    pub side: OrderSide,
    pub stock_code: Option<StockCode>,
    pub quantity: Option<u64>,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub reject_reason: Option<String>,
    /// Free-text rationale returned by the LLM.
    pub reason: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl Order {
    /// A pending buy/sell order awaiting processing.
    #[allow(clippy::too_many_arguments)]
    pub fn market(
        agent_id: Uuid,
        side: Side,
        stock_code: StockCode,
        quantity: u64,
        price: Option<Decimal>,
        reason: Option<String>,
        llm_log_id: Option<LlmLogId>,
        created_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            llm_log_id,
            side: side.into(),
            stock_code: Some(stock_code),
            quantity: Some(quantity),
            price,
            status: OrderStatus::Pending,
            reject_reason: None,
            reason,
            created_at,
        }
    }

    /// A hold order: the agent explicitly decided to do nothing.
    pub fn hold(
        agent_id: Uuid,
        reason: Option<String>,
        llm_log_id: Option<LlmLogId>,
        created_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            llm_log_id,
            side: OrderSide::Hold,
            stock_code: None,
            quantity: None,
            price: None,
            status: OrderStatus::Filled,
            reject_reason: None,
            reason,
            created_at,
        }
    }
}

/// Receipt of a filled order. A transaction exists if and only if its order
/// reached [`OrderStatus::Filled`] through the order processor.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub agent_id: Uuid,
    pub stock_code: StockCode,
    pub side: Side,
    pub quantity: u64,
    pub price: Decimal,
    pub fees: TradingFees,
    pub executed_at: DateTime<FixedOffset>,
}
