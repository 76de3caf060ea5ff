use crate::{
    order::{Order, OrderStatus, Transaction},
    portfolio::{Portfolio, manager},
};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradefleet_market::{RuleViolation, Side, StockCode, rules};
use uuid::Uuid;

/// Why an order was rejected instead of filled. The taxonomy spans rule
/// violations (code, lot, price band, T+1), resource shortfalls (cash,
/// position) and state conditions (market closed).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum RejectReason {
    #[error("market closed at {0}")]
    NotTradingTime(DateTime<FixedOffset>),

    #[error(transparent)]
    Rule(#[from] RuleViolation),

    #[error(transparent)]
    Resource(#[from] manager::ResourceViolation),

    #[error("order is missing its stock code")]
    MissingStockCode,

    #[error("order is missing its quantity")]
    MissingQuantity,

    #[error("order is missing its price and no market price was available")]
    MissingPrice,
}

impl RejectReason {
    /// Stable machine-readable code for persisted rejection records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotTradingTime(_) => "NOT_TRADING_TIME",
            Self::Rule(violation) => violation.code(),
            Self::Resource(violation) => violation.code(),
            Self::MissingStockCode => "MISSING_STOCK_CODE",
            Self::MissingQuantity => "MISSING_QUANTITY",
            Self::MissingPrice => "INVALID_PRICE",
        }
    }
}

/// Successful processing outcome: the filled order, its transaction receipt
/// and the portfolio after the trade.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Fill {
    pub order: Order,
    pub transaction: Transaction,
    pub portfolio: Portfolio,
}

/// Failed processing outcome: the rejected order (with `reject_reason` set)
/// and the structured reason. The input portfolio is untouched.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Rejection {
    pub order: Order,
    pub reason: RejectReason,
}

/// Validates one order end-to-end against the trading rules and the agent's
/// portfolio, then applies the cash/position state transition.
///
/// Validation order (first failure wins): trading hours (live mode only),
/// stock code, quantity lot, price band, then side-specific cash or
/// position/T+1 checks.
#[derive(Debug, Clone)]
pub struct OrderProcessor {
    /// When true, orders outside continuous trading sessions are rejected.
    pub live_mode: bool,
    pub commission_rate: Decimal,
}

impl Default for OrderProcessor {
    fn default() -> Self {
        Self {
            live_mode: false,
            commission_rate: rules::default_commission_rate(),
        }
    }
}

impl OrderProcessor {
    pub fn new(live_mode: bool, commission_rate: Decimal) -> Self {
        Self {
            live_mode,
            commission_rate,
        }
    }

    /// Process `order` against `portfolio`, using `prev_close` for the price
    /// band and `now` for trading-hour and T+1 dates.
    pub fn process(
        &self,
        order: Order,
        portfolio: &Portfolio,
        prev_close: Decimal,
        now: DateTime<FixedOffset>,
    ) -> Result<Fill, Rejection> {
        match self.validate(&order, portfolio, prev_close, now) {
            Ok(validated) => Ok(self.execute(order, validated, portfolio, now)),
            Err(reason) => Err(reject(order, reason)),
        }
    }

    fn validate(
        &self,
        order: &Order,
        portfolio: &Portfolio,
        prev_close: Decimal,
        now: DateTime<FixedOffset>,
    ) -> Result<Validated, RejectReason> {
        if self.live_mode && !rules::is_trading_time(now) {
            return Err(RejectReason::NotTradingTime(now));
        }

        let Some(side) = order.side.trade_side() else {
            // Hold orders bypass the processor entirely.
            return Err(RejectReason::MissingStockCode);
        };
        let code = order
            .stock_code
            .clone()
            .ok_or(RejectReason::MissingStockCode)?;
        let quantity = order.quantity.ok_or(RejectReason::MissingQuantity)?;
        let price = order.price.ok_or(RejectReason::MissingPrice)?;

        rules::validate_quantity(quantity as i64).map_err(RejectReason::Rule)?;
        rules::validate_price_limit(&code, price, prev_close).map_err(RejectReason::Rule)?;

        match side {
            Side::Buy => {
                manager::validate_cash_sufficient(
                    portfolio.cash,
                    price,
                    quantity,
                    code.board(),
                    self.commission_rate,
                )?;
            }
            Side::Sell => {
                let position = portfolio.position(&code);
                let sell_date = now.date_naive();
                if let Some(position) = position {
                    rules::validate_t_plus_1(position.buy_date, sell_date)
                        .map_err(RejectReason::Rule)?;
                }
                manager::validate_position_sufficient(position, &code, quantity, sell_date)?;
            }
        }

        Ok(Validated {
            side,
            code,
            quantity,
            price,
        })
    }

    fn execute(
        &self,
        mut order: Order,
        validated: Validated,
        portfolio: &Portfolio,
        now: DateTime<FixedOffset>,
    ) -> Fill {
        let Validated {
            side,
            code,
            quantity,
            price,
        } = validated;

        let notional = price * Decimal::from(quantity);
        let fees = rules::calculate_fees(notional, side, code.board(), self.commission_rate);

        let mut portfolio = portfolio.clone();
        match side {
            Side::Buy => {
                portfolio.cash -= notional + fees.total();
                portfolio.apply_buy(code.clone(), quantity, price, now.date_naive());
            }
            Side::Sell => {
                portfolio.cash += notional - fees.total();
                portfolio.apply_sell(&code, quantity);
            }
        }

        order.status = OrderStatus::Filled;
        let transaction = Transaction {
            id: Uuid::new_v4(),
            order_id: order.id,
            agent_id: order.agent_id,
            stock_code: code,
            side,
            quantity,
            price,
            fees,
            executed_at: now,
        };

        Fill {
            order,
            transaction,
            portfolio,
        }
    }
}

struct Validated {
    side: Side,
    code: StockCode,
    quantity: u64,
    price: Decimal,
}

fn reject(mut order: Order, reason: RejectReason) -> Rejection {
    order.status = OrderStatus::Rejected;
    order.reject_reason = Some(reason.to_string());
    Rejection { order, reason }
}
