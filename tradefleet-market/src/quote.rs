use crate::code::StockCode;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Daily OHLC quote for one stock. Prices carry three decimals, the traded
/// amount two.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, derive_more::Constructor)]
pub struct Quote {
    pub stock_code: StockCode,
    pub trade_date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub prev_close: Decimal,
    pub volume: u64,
    pub amount: Decimal,
}

/// Failure of the external market-data provider. All variants are
/// recoverable: the decision pipeline proceeds with partial context.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum MarketDataError {
    #[error("no quote stored for {0}")]
    QuoteNotFound(StockCode),

    #[error("market data source unavailable: {0}")]
    Unavailable(String),
}

/// Contract fulfilled by the market-data collectors.
#[async_trait]
pub trait MarketData {
    /// Most recent stored quote for `code`.
    async fn latest_quote(&self, code: &StockCode) -> Result<Quote, MarketDataError>;

    /// Stored quotes for `code` inside `[from, to]`, oldest first.
    async fn quote_history(
        &self,
        code: &StockCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Quote>, MarketDataError>;

    /// Codes currently trending, most active first.
    async fn hot_stocks(&self, limit: usize) -> Result<Vec<StockCode>, MarketDataError>;

    /// Best-effort snapshot for a set of codes; missing codes are omitted.
    async fn realtime_quotes(
        &self,
        codes: &[StockCode],
    ) -> Result<HashMap<StockCode, Quote>, MarketDataError>;
}

/// Deterministic in-memory [`MarketData`] backed by pre-loaded quotes.
/// Used by tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct FixedQuotes {
    /// Quotes per code, oldest first.
    quotes: HashMap<StockCode, Vec<Quote>>,
    hot: Vec<StockCode>,
}

impl FixedQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a quote, keeping the per-code series ordered by trade date.
    pub fn insert(&mut self, quote: Quote) {
        let series = self.quotes.entry(quote.stock_code.clone()).or_default();
        series.push(quote);
        series.sort_by_key(|quote| quote.trade_date);
    }

    pub fn set_hot_stocks(&mut self, codes: Vec<StockCode>) {
        self.hot = codes;
    }
}

#[async_trait]
impl MarketData for FixedQuotes {
    async fn latest_quote(&self, code: &StockCode) -> Result<Quote, MarketDataError> {
        self.quotes
            .get(code)
            .and_then(|series| series.last())
            .cloned()
            .ok_or_else(|| MarketDataError::QuoteNotFound(code.clone()))
    }

    async fn quote_history(
        &self,
        code: &StockCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Quote>, MarketDataError> {
        Ok(self
            .quotes
            .get(code)
            .map(|series| {
                series
                    .iter()
                    .filter(|quote| quote.trade_date >= from && quote.trade_date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hot_stocks(&self, limit: usize) -> Result<Vec<StockCode>, MarketDataError> {
        Ok(self.hot.iter().take(limit).cloned().collect())
    }

    async fn realtime_quotes(
        &self,
        codes: &[StockCode],
    ) -> Result<HashMap<StockCode, Quote>, MarketDataError> {
        let mut snapshot = HashMap::with_capacity(codes.len());
        for code in codes {
            if let Ok(quote) = self.latest_quote(code).await {
                snapshot.insert(code.clone(), quote);
            }
        }
        Ok(snapshot)
    }
}
