use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tradefleet_market::StockCode;
use uuid::Uuid;

/// Sufficiency checks for cash and positions.
pub mod manager;

/// Valuation and performance metrics.
pub mod metrics;

pub use manager::ResourceViolation;
pub use metrics::PortfolioMetrics;

/// One holding inside a [`Portfolio`].
///
/// `buy_date` is the most recent buy date among aggregated lots and drives
/// the T+1 restriction for the whole position.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, derive_more::Constructor)]
pub struct Position {
    pub stock_code: StockCode,
    pub shares: u64,
    pub avg_cost: Decimal,
    pub buy_date: NaiveDate,
}

/// The cash and positions owned by one agent.
///
/// Positions are keyed by stock code, so at most one position per code can
/// exist; insertion order is preserved. Zero-share positions are removed on
/// sell, never stored.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Portfolio {
    pub agent_id: Uuid,
    pub cash: Decimal,
    pub positions: IndexMap<StockCode, Position>,
}

impl Portfolio {
    pub fn new(agent_id: Uuid, cash: Decimal) -> Self {
        Self {
            agent_id,
            cash,
            positions: IndexMap::new(),
        }
    }

    pub fn position(&self, code: &StockCode) -> Option<&Position> {
        self.positions.get(code)
    }

    /// Apply a filled buy: upsert the position with share-weighted average
    /// cost and refresh `buy_date` to the trade date.
    pub fn apply_buy(
        &mut self,
        code: StockCode,
        quantity: u64,
        price: Decimal,
        trade_date: NaiveDate,
    ) {
        match self.positions.get_mut(&code) {
            Some(position) => {
                let old_shares = Decimal::from(position.shares);
                let new_shares = Decimal::from(position.shares + quantity);
                let total_cost = position.avg_cost * old_shares + price * Decimal::from(quantity);
                position.avg_cost = total_cost / new_shares;
                position.shares += quantity;
                position.buy_date = trade_date;
            }
            None => {
                self.positions.insert(
                    code.clone(),
                    Position::new(code, quantity, price, trade_date),
                );
            }
        }
    }

    /// Apply a filled sell, removing the position once it reaches zero
    /// shares. Callers must have validated sufficiency first.
    pub fn apply_sell(&mut self, code: &StockCode, quantity: u64) {
        if let Some(position) = self.positions.get_mut(code) {
            position.shares = position.shares.saturating_sub(quantity);
            if position.shares == 0 {
                self.positions.shift_remove(code);
            }
        }
    }

    /// Market value of all positions, falling back to average cost for codes
    /// missing from `prices`.
    pub fn market_value(&self, prices: &HashMap<StockCode, Decimal>) -> Decimal {
        self.positions
            .values()
            .map(|position| {
                let price = prices
                    .get(&position.stock_code)
                    .copied()
                    .unwrap_or(position.avg_cost);
                price * Decimal::from(position.shares)
            })
            .sum()
    }

    /// Cash plus the market value of all positions.
    pub fn total_assets(&self, prices: &HashMap<StockCode, Decimal>) -> Decimal {
        self.cash + self.market_value(prices)
    }

    /// Verify the structural invariants every persisted portfolio must hold.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.cash < Decimal::ZERO {
            return Err(InvariantViolation::NegativeCash(self.cash));
        }
        for position in self.positions.values() {
            if position.shares == 0 {
                return Err(InvariantViolation::EmptyPosition(
                    position.stock_code.clone(),
                ));
            }
            if position.avg_cost <= Decimal::ZERO {
                return Err(InvariantViolation::NonPositiveCost(
                    position.stock_code.clone(),
                ));
            }
        }
        Ok(())
    }
}

/// Violation of a persisted-portfolio invariant; indicates a bug in order
/// processing rather than a rejectable user input.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum InvariantViolation {
    #[error("portfolio cash is negative: {0}")]
    NegativeCash(Decimal),

    #[error("position {0} has zero shares")]
    EmptyPosition(StockCode),

    #[error("position {0} has non-positive average cost")]
    NonPositiveCost(StockCode),
}
