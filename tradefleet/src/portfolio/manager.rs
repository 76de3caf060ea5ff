use super::Position;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradefleet_market::{Board, Side, StockCode, rules};

/// Insufficient funds or holdings for a requested trade.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ResourceViolation {
    #[error("insufficient cash: required {required}, available {available}")]
    InsufficientCash {
        required: Decimal,
        available: Decimal,
    },

    #[error("no position held in {0}")]
    NoPosition(StockCode),

    #[error("insufficient sellable shares in {code}: requested {requested}, sellable {sellable}")]
    InsufficientShares {
        code: StockCode,
        requested: u64,
        sellable: u64,
    },
}

impl ResourceViolation {
    /// Stable machine-readable code for persisted rejection records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientCash { .. } => "INSUFFICIENT_CASH",
            Self::NoPosition(_) => "NO_POSITION",
            Self::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
        }
    }
}

/// Verify `cash` covers the buy notional plus its buy-side fees.
pub fn validate_cash_sufficient(
    cash: Decimal,
    price: Decimal,
    quantity: u64,
    board: Board,
    commission_rate: Decimal,
) -> Result<(), ResourceViolation> {
    let notional = price * Decimal::from(quantity);
    let fees = rules::calculate_fees(notional, Side::Buy, board, commission_rate);
    let required = notional + fees.total();

    if cash < required {
        return Err(ResourceViolation::InsufficientCash {
            required,
            available: cash,
        });
    }
    Ok(())
}

/// Shares of `position` sellable on `sell_date` under T+1: zero on the buy
/// date itself, the whole position afterwards.
pub fn sellable_shares(position: &Position, sell_date: NaiveDate) -> u64 {
    if sell_date <= position.buy_date {
        0
    } else {
        position.shares
    }
}

/// Verify a sell is backed by a sufficient, T+1-unlocked position.
pub fn validate_position_sufficient(
    position: Option<&Position>,
    code: &StockCode,
    quantity: u64,
    sell_date: NaiveDate,
) -> Result<(), ResourceViolation> {
    let Some(position) = position.filter(|position| position.shares > 0) else {
        return Err(ResourceViolation::NoPosition(code.clone()));
    };

    let sellable = sellable_shares(position, sell_date);
    if sellable < quantity {
        return Err(ResourceViolation::InsufficientShares {
            code: code.clone(),
            requested: quantity,
            sellable,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn code(s: &str) -> StockCode {
        StockCode::parse(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cash_sufficient_includes_fees() {
        // 100 * 10 = 1000 notional, commission floored at 5.00, transfer 0.02.
        let rate = rules::default_commission_rate();
        assert!(validate_cash_sufficient(dec!(1005.02), dec!(10), 100, Board::ShMain, rate).is_ok());
        assert_eq!(
            validate_cash_sufficient(dec!(1005.01), dec!(10), 100, Board::ShMain, rate),
            Err(ResourceViolation::InsufficientCash {
                required: dec!(1005.02),
                available: dec!(1005.01),
            })
        );
    }

    #[test]
    fn test_sellable_shares_respects_t_plus_1() {
        let position = Position::new(code("000001"), 200, dec!(9.000), date(2024, 6, 3));
        assert_eq!(sellable_shares(&position, date(2024, 6, 3)), 0);
        assert_eq!(sellable_shares(&position, date(2024, 6, 4)), 200);
    }

    #[test]
    fn test_position_sufficient() {
        let position = Position::new(code("000001"), 200, dec!(9.000), date(2024, 6, 3));
        let sell_date = date(2024, 6, 4);

        assert!(
            validate_position_sufficient(Some(&position), &code("000001"), 200, sell_date).is_ok()
        );
        assert_eq!(
            validate_position_sufficient(Some(&position), &code("000001"), 300, sell_date),
            Err(ResourceViolation::InsufficientShares {
                code: code("000001"),
                requested: 300,
                sellable: 200,
            })
        );
        assert_eq!(
            validate_position_sufficient(None, &code("000001"), 100, sell_date),
            Err(ResourceViolation::NoPosition(code("000001")))
        );
    }
}
