use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Flattened facts handed to prompt templates.
///
/// Every field is optional: collectors fail independently and the pipeline
/// proceeds with partial context. [`Self::flat_map`] omits absent fields, so
/// templates referencing them render empty rather than failing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub cash: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub total_assets: Option<Decimal>,
    /// Cumulative return as a ratio, eg/ `0.05` for 5%.
    pub return_rate: Option<Decimal>,
    /// Positions rendered as a JSON array.
    pub positions: Option<String>,
    /// Whole portfolio rendered as a JSON object.
    pub portfolio_status: Option<String>,
    pub market_summary: Option<String>,
    pub hot_stocks_quotes: Option<String>,
    pub positions_quotes: Option<String>,
    pub sentiment_score: Option<f64>,
    pub current_time: Option<String>,
    pub current_date: Option<String>,
    pub current_weekday: Option<String>,
    pub is_trading_day: Option<bool>,
    /// Marketplace tools block, pre-rendered by the tool registry.
    pub tools: Option<String>,
}

impl PromptContext {
    /// The flat variable dictionary templates substitute over.
    pub fn flat_map(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();

        insert(&mut map, "cash", self.cash.map(|value| value.to_string()));
        insert(
            &mut map,
            "market_value",
            self.market_value.map(|value| value.to_string()),
        );
        insert(
            &mut map,
            "total_assets",
            self.total_assets.map(|value| value.to_string()),
        );
        insert(
            &mut map,
            "return_rate",
            self.return_rate.map(|value| value.to_string()),
        );
        insert(&mut map, "positions", self.positions.clone());
        insert(&mut map, "portfolio_status", self.portfolio_status.clone());
        insert(&mut map, "market_summary", self.market_summary.clone());
        insert(&mut map, "hot_stocks_quotes", self.hot_stocks_quotes.clone());
        insert(&mut map, "positions_quotes", self.positions_quotes.clone());
        insert(
            &mut map,
            "sentiment_score",
            self.sentiment_score.map(|value| value.to_string()),
        );
        insert(&mut map, "current_time", self.current_time.clone());
        insert(&mut map, "current_date", self.current_date.clone());
        insert(&mut map, "current_weekday", self.current_weekday.clone());
        insert(
            &mut map,
            "is_trading_day",
            self.is_trading_day.map(|value| value.to_string()),
        );
        insert(&mut map, "tools", self.tools.clone());

        map
    }
}

fn insert(map: &mut HashMap<&'static str, String>, key: &'static str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key, value);
    }
}
