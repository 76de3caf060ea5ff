use crate::{
    Side,
    code::{Board, InvalidStockCode, StockCode},
};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default commission rate: 3 bp, charged on both sides.
pub fn default_commission_rate() -> Decimal {
    Decimal::new(3, 4)
}

/// Minimum commission per trade: 5.00.
pub fn commission_floor() -> Decimal {
    Decimal::new(500, 2)
}

/// Stamp tax rate: 0.1%, sell side only.
pub fn stamp_tax_rate() -> Decimal {
    Decimal::new(1, 3)
}

/// Transfer fee rate: 0.002%, Shanghai-listed boards only.
pub fn transfer_fee_rate() -> Decimal {
    Decimal::new(2, 5)
}

impl Board {
    /// Daily price-limit ratio for the board: 10% for main boards and the
    /// SME board, 20% for STAR and ChiNext.
    pub fn limit_rate(&self) -> Decimal {
        match self {
            Self::ShMain | Self::SzMain | Self::SzSme => Decimal::new(10, 2),
            Self::Star | Self::ChiNext => Decimal::new(20, 2),
        }
    }
}

/// A violation of A-share microstructure rules.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum RuleViolation {
    #[error("invalid stock code: {0}")]
    InvalidStockCode(#[from] InvalidStockCode),

    #[error("previous close must be positive, got {0}")]
    InvalidPrevClose(Decimal),

    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),

    #[error("price {price} above upper limit {limit}")]
    PriceAboveLimit { price: Decimal, limit: Decimal },

    #[error("price {price} below lower limit {limit}")]
    PriceBelowLimit { price: Decimal, limit: Decimal },

    #[error("quantity must be positive, got {0}")]
    InvalidQuantityValue(i64),

    #[error("quantity {0} is not a multiple of the 100 share lot")]
    InvalidQuantityUnit(i64),

    #[error("shares bought on {buy_date} cannot be sold on {sell_date} (T+1)")]
    TPlus1Violation {
        buy_date: NaiveDate,
        sell_date: NaiveDate,
    },
}

impl RuleViolation {
    /// Stable machine-readable code for persisted rejection records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidStockCode(_) => "INVALID_STOCK_CODE",
            Self::InvalidPrevClose(_) => "INVALID_PREV_CLOSE",
            Self::InvalidPrice(_) => "INVALID_PRICE",
            Self::PriceAboveLimit { .. } => "PRICE_ABOVE_LIMIT",
            Self::PriceBelowLimit { .. } => "PRICE_BELOW_LIMIT",
            Self::InvalidQuantityValue(_) => "INVALID_QUANTITY_VALUE",
            Self::InvalidQuantityUnit(_) => "INVALID_QUANTITY_UNIT",
            Self::TPlus1Violation { .. } => "T_PLUS_1_VIOLATION",
        }
    }
}

/// Round a money amount half-up to two decimals.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Inclusive `[lower, upper]` admissible price band for `board` given the
/// previous close, both bounds rounded half-up to two decimals.
pub fn limit_band(board: Board, prev_close: Decimal) -> Result<(Decimal, Decimal), RuleViolation> {
    if prev_close <= Decimal::ZERO {
        return Err(RuleViolation::InvalidPrevClose(prev_close));
    }

    let rate = board.limit_rate();
    let lower = round_money(prev_close * (Decimal::ONE - rate));
    let upper = round_money(prev_close * (Decimal::ONE + rate));
    Ok((lower, upper))
}

/// Validate that an order price sits inside the daily limit band.
pub fn validate_price_limit(
    code: &StockCode,
    price: Decimal,
    prev_close: Decimal,
) -> Result<(), RuleViolation> {
    let (lower, upper) = limit_band(code.board(), prev_close)?;

    if price <= Decimal::ZERO {
        return Err(RuleViolation::InvalidPrice(price));
    }
    if price < lower {
        return Err(RuleViolation::PriceBelowLimit {
            price,
            limit: lower,
        });
    }
    if price > upper {
        return Err(RuleViolation::PriceAboveLimit {
            price,
            limit: upper,
        });
    }

    Ok(())
}

/// Validate that a trade quantity is a positive multiple of the 100 share lot.
pub fn validate_quantity(quantity: i64) -> Result<(), RuleViolation> {
    if quantity <= 0 {
        return Err(RuleViolation::InvalidQuantityValue(quantity));
    }
    if quantity % 100 != 0 {
        return Err(RuleViolation::InvalidQuantityUnit(quantity));
    }
    Ok(())
}

/// T+1: shares bought on `buy_date` are locked until the next calendar date.
pub fn validate_t_plus_1(buy_date: NaiveDate, sell_date: NaiveDate) -> Result<(), RuleViolation> {
    if sell_date <= buy_date {
        return Err(RuleViolation::TPlus1Violation {
            buy_date,
            sell_date,
        });
    }
    Ok(())
}

/// Per-trade fee breakdown; each component is independently rounded half-up
/// to two decimals.
#[derive(
    Debug, Clone, Eq, PartialEq, Deserialize, Serialize, derive_more::Constructor,
)]
pub struct TradingFees {
    pub commission: Decimal,
    pub stamp_tax: Decimal,
    pub transfer_fee: Decimal,
}

impl TradingFees {
    pub fn total(&self) -> Decimal {
        self.commission + self.stamp_tax + self.transfer_fee
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    }
}

/// Compute the fees for a trade of `notional = price * quantity`:
/// - commission on both sides, floored at 5.00,
/// - stamp tax on sells only,
/// - transfer fee on Shanghai boards only.
pub fn calculate_fees(
    notional: Decimal,
    side: Side,
    board: Board,
    commission_rate: Decimal,
) -> TradingFees {
    let commission = round_money(notional * commission_rate).max(commission_floor());

    let stamp_tax = match side {
        Side::Sell => round_money(notional * stamp_tax_rate()),
        Side::Buy => Decimal::ZERO,
    };

    let transfer_fee = if board.is_shanghai() {
        round_money(notional * transfer_fee_rate())
    } else {
        Decimal::ZERO
    };

    TradingFees::new(commission, stamp_tax, transfer_fee)
}

/// Whether `dt` falls inside a continuous trading session:
/// Monday to Friday, 09:30-11:30 or 13:00-15:00, bounds inclusive.
///
/// Public holidays are not modelled; weekday alone decides the trading day.
pub fn is_trading_time(dt: DateTime<FixedOffset>) -> bool {
    if !is_trading_day(dt.date_naive()) {
        return false;
    }

    let time = dt.time();
    let morning = session(9, 30)..=session(11, 30);
    let afternoon = session(13, 0)..=session(15, 0);

    morning.contains(&time) || afternoon.contains(&time)
}

/// Whether `date` is a trading day (Monday to Friday, no holiday calendar).
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn session(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .expect("session boundaries are valid wall-clock times")
}
