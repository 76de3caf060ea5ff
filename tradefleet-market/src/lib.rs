//! # Tradefleet-Market
//! A-share market structure and microstructure rules used by the rest of the
//! `Tradefleet` ecosystem.
//!
//! - **Codes & boards**: validated [`StockCode`](code::StockCode) newtype and
//!   [`Board`](code::Board) classification by 6-digit prefix.
//! - **Rules**: daily price-limit bands, 100-share lot checks, T+1 holding
//!   restrictions, per-trade fee computation and the exchange trading
//!   calendar. All pure functions returning structured [`RuleViolation`](rules::RuleViolation)s.
//! - **Quotes**: the [`Quote`](quote::Quote) record and the [`MarketData`](quote::MarketData)
//!   contract fulfilled by external collectors.
//!
//! All money values are `rust_decimal::Decimal` (prices three decimals,
//! amounts two); wall-clock times are UTC+8, the exchange timezone.

use serde::{Deserialize, Serialize};

/// Stock code parsing, exchange-suffix handling and board classification.
pub mod code;

/// Trading rules: price limits, quantity lots, T+1, fees, trading sessions.
pub mod rules;

/// Quote data structures and the market-data provider contract.
pub mod quote;

/// Exchange timezone (UTC+8) clock utilities.
pub mod calendar;

pub use code::{Board, InvalidStockCode, StockCode};
pub use quote::{FixedQuotes, MarketData, MarketDataError, Quote};
pub use rules::{RuleViolation, TradingFees};

/// Trade direction of an order or fill.
///
/// `hold`-style no-op decisions never reach the rules engine, so they are not
/// representable here; see the order model of the core crate.
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
pub enum Side {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}
