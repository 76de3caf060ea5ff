use super::Portfolio;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tradefleet_market::StockCode;

/// Performance snapshot of one portfolio, fed into prompt contexts and
/// status views.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PortfolioMetrics {
    pub total_assets: Decimal,
    pub market_value: Decimal,
    pub cash: Decimal,
    pub total_return: Decimal,
    pub return_rate: Decimal,
    pub annualized_return: Option<Decimal>,
    pub max_drawdown: Option<Decimal>,
}

/// `(total_assets - initial_cash) / initial_cash`, rounded half-up to four
/// decimals; zero when `initial_cash` is not positive.
pub fn return_rate(total_assets: Decimal, initial_cash: Decimal) -> Decimal {
    if initial_cash <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_ratio((total_assets - initial_cash) / initial_cash)
}

/// Largest peak-to-trough decline over an asset-value series, as a ratio
/// rounded to four decimals. Zero for series shorter than two points.
pub fn max_drawdown(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }

    let mut max_drawdown = Decimal::ZERO;
    let mut peak = values[0];

    for &value in values {
        if value > peak {
            peak = value;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - value) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    round_ratio(max_drawdown)
}

/// `(1 + return_rate)^(365 / days_held) - 1`, rounded to four decimals.
///
/// Undefined (`None`) when no full day has elapsed or when the return rate
/// has lost the entire stake (the power is not real below -1).
pub fn annualized_return(return_rate: Decimal, days_held: u32) -> Option<Decimal> {
    if days_held == 0 || return_rate <= Decimal::NEGATIVE_ONE {
        return None;
    }

    let exponent = Decimal::from(365) / Decimal::from(days_held);
    (Decimal::ONE + return_rate)
        .checked_powd(exponent)
        .map(|grown| round_ratio(grown - Decimal::ONE))
}

/// Assemble the full [`PortfolioMetrics`] snapshot.
pub fn portfolio_metrics(
    portfolio: &Portfolio,
    initial_cash: Decimal,
    prices: &HashMap<StockCode, Decimal>,
    asset_history: Option<&[Decimal]>,
    days_held: u32,
) -> PortfolioMetrics {
    let market_value = portfolio.market_value(prices);
    let total_assets = portfolio.cash + market_value;
    let return_rate = return_rate(total_assets, initial_cash);

    PortfolioMetrics {
        total_assets,
        market_value,
        cash: portfolio.cash,
        total_return: total_assets - initial_cash,
        return_rate,
        annualized_return: annualized_return(return_rate, days_held),
        max_drawdown: asset_history.map(max_drawdown),
    }
}

fn round_ratio(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_return_rate() {
        assert_eq!(return_rate(dec!(21000), dec!(20000)), dec!(0.05));
        assert_eq!(return_rate(dec!(19000), dec!(20000)), dec!(-0.05));
        assert_eq!(return_rate(dec!(21000), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_max_drawdown_peak_tracking() {
        let series = [dec!(100), dec!(120), dec!(90), dec!(110), dec!(80)];
        // Peak 120, trough 80: (120 - 80) / 120 = 0.3333.
        assert_eq!(max_drawdown(&series), dec!(0.3333));
    }

    #[test]
    fn test_max_drawdown_short_series_is_zero() {
        assert_eq!(max_drawdown(&[]), Decimal::ZERO);
        assert_eq!(max_drawdown(&[dec!(100)]), Decimal::ZERO);
    }

    #[test]
    fn test_max_drawdown_monotonic_rise_is_zero() {
        assert_eq!(max_drawdown(&[dec!(1), dec!(2), dec!(3)]), Decimal::ZERO);
    }

    #[test]
    fn test_annualized_return() {
        // 5% over a full year stays 5%.
        assert_eq!(annualized_return(dec!(0.05), 365), Some(dec!(0.05)));
        assert_eq!(annualized_return(dec!(0.05), 0), None);
        assert_eq!(annualized_return(dec!(-1), 30), None);

        // 1% over ~half a year annualizes above 2%.
        let half_year = annualized_return(dec!(0.01), 182).unwrap();
        assert!(half_year > dec!(0.02));
    }
}
