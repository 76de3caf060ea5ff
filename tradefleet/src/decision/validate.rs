use super::TradingDecision;
use crate::{execution::RejectReason, portfolio::Portfolio, portfolio::manager};
use rust_decimal::Decimal;
use tradefleet_market::{RuleViolation, StockCode, rules};

/// Validate one parsed decision against the trading rules and, when
/// supplied, the agent's portfolio and the previous close.
///
/// Hold and wait decisions are always valid. Buy and sell decisions require
/// a valid stock code and a lot-aligned quantity; a supplied price must be
/// positive and, given `prev_close`, inside the limit band; a buy with a
/// known price must be covered by the portfolio's cash.
pub fn validate_decision(
    decision: &TradingDecision,
    portfolio: Option<&Portfolio>,
    prev_close: Option<Decimal>,
    commission_rate: Decimal,
) -> Result<(), RejectReason> {
    if !decision.decision.is_trade() {
        return Ok(());
    }

    let code_raw = decision
        .stock_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or(RejectReason::MissingStockCode)?;
    let code = StockCode::parse(code_raw)
        .map_err(|error| RejectReason::Rule(RuleViolation::InvalidStockCode(error)))?;

    let quantity = decision.quantity.ok_or(RejectReason::MissingQuantity)?;
    rules::validate_quantity(quantity).map_err(RejectReason::Rule)?;

    if let Some(price) = decision.price {
        if price <= Decimal::ZERO {
            return Err(RejectReason::Rule(RuleViolation::InvalidPrice(price)));
        }
        if let Some(prev_close) = prev_close {
            rules::validate_price_limit(&code, price, prev_close).map_err(RejectReason::Rule)?;
        }
    }

    if decision.decision == super::DecisionType::Buy {
        if let (Some(portfolio), Some(price)) = (portfolio, decision.price) {
            manager::validate_cash_sufficient(
                portfolio.cash,
                price,
                quantity as u64,
                code.board(),
                commission_rate,
            )?;
        }
    }

    Ok(())
}
