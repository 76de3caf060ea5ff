use crate::{
    decision::{DecisionType, TradingDecision, parser, validate},
    execution::OrderProcessor,
    order::{Order, Transaction},
    portfolio::{Portfolio, metrics},
    store::{FleetRepository, RepositoryError},
};
use async_trait::async_trait;
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};
use tradefleet_llm::{ChatRequest, LlmError, LlmLogId, Message};
use tradefleet_market::{
    MarketData, Quote, StockCode,
    calendar::{china_now, weekday_name},
    rules,
};
use uuid::Uuid;

/// Prompt context assembly.
pub mod context;

/// Prompt templates and the built-in default prompt.
pub mod prompt;

/// Provider-id to chat-client resolution.
pub mod provider;

pub use context::PromptContext;
pub use prompt::PromptLibrary;
pub use provider::LlmProviderRegistry;

/// How many trending codes are quoted into the prompt context.
const HOT_STOCK_LIMIT: usize = 5;

/// Why a decision cycle aborted before producing orders.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CycleError {
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("agent {0} is not active")]
    AgentInactive(Uuid),

    #[error("portfolio not found for agent {0}")]
    PortfolioNotFound(Uuid),

    #[error("agent has no provider configured")]
    ProviderNotConfigured,

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("provider disabled: {0}")]
    ProviderDisabled(String),

    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    #[error("no decisions could be parsed from the reply")]
    Unparseable,

    #[error("all decisions failed validation: {0}")]
    AllDecisionsInvalid(String),

    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

/// Optional inputs a caller may supply instead of the market-data provider.
#[derive(Debug, Clone, Default)]
pub struct CycleOverrides {
    pub market_summary: Option<String>,
    pub sentiment_score: Option<f64>,
    /// Current prices used for valuation, keyed by code.
    pub prices: HashMap<StockCode, Decimal>,
}

/// One persisted order produced by a cycle, with its transaction when the
/// order filled.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OrderOutcome {
    pub order: Order,
    pub transaction: Option<Transaction>,
}

/// Everything one decision cycle produced.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CycleOutcome {
    pub agent_id: Uuid,
    pub llm_log_id: Option<LlmLogId>,
    pub orders: Vec<OrderOutcome>,
    pub raw_response: String,
}

/// The seam the task executor drives; implemented by [`AgentEngine`] and by
/// scripted runners in tests.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, agent_id: Uuid) -> Result<CycleOutcome, CycleError>;
}

/// Runs the full decision cycle for one agent: load state, assemble the
/// prompt, call the LLM, parse and validate decisions, and hand the
/// survivors to the order processor in order.
///
/// Single-threaded with respect to one agent; the scheduler's coalescing
/// guard prevents overlapping cycles.
pub struct AgentEngine {
    repository: Arc<dyn FleetRepository>,
    providers: Arc<LlmProviderRegistry>,
    market_data: Arc<dyn MarketData + Send + Sync>,
    templates: Arc<PromptLibrary>,
    processor: OrderProcessor,
}

impl AgentEngine {
    pub fn new(
        repository: Arc<dyn FleetRepository>,
        providers: Arc<LlmProviderRegistry>,
        market_data: Arc<dyn MarketData + Send + Sync>,
    ) -> Self {
        Self {
            repository,
            providers,
            market_data,
            templates: Arc::new(PromptLibrary::new()),
            processor: OrderProcessor::default(),
        }
    }

    pub fn with_processor(mut self, processor: OrderProcessor) -> Self {
        self.processor = processor;
        self
    }

    pub fn templates(&self) -> &Arc<PromptLibrary> {
        &self.templates
    }

    /// Execute one decision cycle for `agent_id`.
    pub async fn run_cycle(
        &self,
        agent_id: Uuid,
        overrides: CycleOverrides,
    ) -> Result<CycleOutcome, CycleError> {
        let agent = self.repository.agent(agent_id).await.map_err(|error| {
            match error {
                RepositoryError::AgentNotFound(id) => CycleError::AgentNotFound(id),
                other => CycleError::Repository(other),
            }
        })?;
        if !agent.is_active() {
            return Err(CycleError::AgentInactive(agent_id));
        }

        let client = self.providers.resolve(agent.provider_id.as_deref())?;

        let portfolio = self
            .repository
            .portfolio(agent_id)
            .await
            .map_err(|error| match error {
                RepositoryError::PortfolioNotFound(id) => CycleError::PortfolioNotFound(id),
                other => CycleError::Repository(other),
            })?;

        let context = self
            .build_context(agent.initial_cash, &portfolio, &overrides)
            .await;
        let prompt = self.render_prompt(agent.template_id, &context);

        let outcome = client
            .chat(ChatRequest {
                messages: vec![Message::user(prompt)],
                model: Some(agent.model_name.clone()),
                agent_id: Some(agent_id.to_string()),
                ..Default::default()
            })
            .await?;
        let raw_response = outcome.response.content;
        let llm_log_id = outcome.log_id;

        let decisions = parser::parse_decisions(&raw_response);
        if decisions.is_empty() {
            return Err(CycleError::Unparseable);
        }

        let survivors = self.validate_decisions(decisions, &portfolio).await?;

        let orders = self
            .execute_decisions(agent_id, portfolio, survivors, llm_log_id)
            .await?;

        info!(
            %agent_id,
            orders = orders.len(),
            filled = orders
                .iter()
                .filter(|outcome| outcome.transaction.is_some())
                .count(),
            "decision cycle complete"
        );

        Ok(CycleOutcome {
            agent_id,
            llm_log_id,
            orders,
            raw_response,
        })
    }

    /// Assemble the prompt context, tolerating market-data failures: absent
    /// blocks are simply omitted.
    async fn build_context(
        &self,
        initial_cash: Decimal,
        portfolio: &Portfolio,
        overrides: &CycleOverrides,
    ) -> PromptContext {
        let now = china_now();

        let position_codes = portfolio.positions.keys().cloned().collect::<Vec<_>>();
        let mut prices = overrides.prices.clone();
        if prices.is_empty() && !position_codes.is_empty() {
            if let Ok(snapshot) = self.market_data.realtime_quotes(&position_codes).await {
                prices = snapshot
                    .into_iter()
                    .map(|(code, quote)| (code, quote.close))
                    .collect();
            }
        }

        let market_value = portfolio.market_value(&prices);
        let total_assets = portfolio.cash + market_value;

        let positions = portfolio
            .positions
            .values()
            .collect::<Vec<_>>();

        PromptContext {
            cash: Some(portfolio.cash),
            market_value: Some(market_value),
            total_assets: Some(total_assets),
            return_rate: Some(metrics::return_rate(total_assets, initial_cash)),
            positions: serde_json::to_string(&positions).ok(),
            portfolio_status: serde_json::to_string(portfolio).ok(),
            market_summary: overrides.market_summary.clone(),
            hot_stocks_quotes: self.hot_stock_quotes().await,
            positions_quotes: self.position_quotes(&position_codes).await,
            sentiment_score: overrides.sentiment_score,
            current_time: Some(now.format("%H:%M:%S").to_string()),
            current_date: Some(now.format("%Y-%m-%d").to_string()),
            current_weekday: Some(weekday_name(now.weekday()).to_string()),
            is_trading_day: Some(rules::is_trading_day(now.date_naive())),
            tools: None,
        }
    }

    async fn hot_stock_quotes(&self) -> Option<String> {
        let codes = self.market_data.hot_stocks(HOT_STOCK_LIMIT).await.ok()?;
        if codes.is_empty() {
            return None;
        }
        Some(self.quote_lines(&codes).await)
    }

    async fn position_quotes(&self, codes: &[StockCode]) -> Option<String> {
        if codes.is_empty() {
            return None;
        }
        Some(self.quote_lines(codes).await)
    }

    async fn quote_lines(&self, codes: &[StockCode]) -> String {
        let mut lines = Vec::with_capacity(codes.len());
        for code in codes {
            match self.market_data.latest_quote(code).await {
                Ok(quote) => lines.push(format_quote_line(&quote)),
                Err(error) => {
                    warn!(code = %code, %error, "quote unavailable, omitting from context");
                }
            }
        }
        lines.join("\n")
    }

    fn render_prompt(&self, template_id: Option<Uuid>, context: &PromptContext) -> String {
        if let Some(template_id) = template_id {
            match self.templates.render(template_id, context) {
                Ok(prompt) => return prompt,
                Err(error) => {
                    warn!(%template_id, %error, "template render failed, using default prompt");
                }
            }
        }
        prompt::default_prompt(context)
    }

    /// Drop invalid decisions (with a warning each); abort when none survive.
    async fn validate_decisions(
        &self,
        decisions: Vec<TradingDecision>,
        portfolio: &Portfolio,
    ) -> Result<Vec<TradingDecision>, CycleError> {
        let mut survivors = Vec::with_capacity(decisions.len());
        let mut last_error = None;

        for decision in decisions {
            let prev_close = match decision.stock_code.as_deref().map(StockCode::parse) {
                Some(Ok(code)) => self
                    .market_data
                    .latest_quote(&code)
                    .await
                    .ok()
                    .map(|quote| quote.prev_close),
                _ => None,
            };

            match validate::validate_decision(
                &decision,
                Some(portfolio),
                prev_close,
                self.processor.commission_rate,
            ) {
                Ok(()) => survivors.push(decision),
                Err(reason) => {
                    warn!(
                        code = reason.code(),
                        stock_code = decision.stock_code.as_deref().unwrap_or("-"),
                        "dropping invalid decision: {reason}"
                    );
                    last_error = Some(reason.to_string());
                }
            }
        }

        if survivors.is_empty() {
            return Err(CycleError::AllDecisionsInvalid(
                last_error.unwrap_or_else(|| "no valid decisions".to_string()),
            ));
        }
        Ok(survivors)
    }

    /// Turn surviving decisions into persisted orders, strictly in list
    /// order: each fill consumes from the same cash pool.
    async fn execute_decisions(
        &self,
        agent_id: Uuid,
        mut portfolio: Portfolio,
        decisions: Vec<TradingDecision>,
        llm_log_id: Option<LlmLogId>,
    ) -> Result<Vec<OrderOutcome>, CycleError> {
        let now = china_now();
        let mut outcomes = Vec::with_capacity(decisions.len());

        for decision in decisions {
            match decision.decision {
                DecisionType::Hold | DecisionType::Wait => {
                    let order = Order::hold(agent_id, decision.reason.clone(), llm_log_id, now);
                    self.repository.persist_order(order.clone()).await?;
                    outcomes.push(OrderOutcome {
                        order,
                        transaction: None,
                    });
                }
                DecisionType::Buy | DecisionType::Sell => {
                    let Some(Ok(code)) = decision.stock_code.as_deref().map(StockCode::parse)
                    else {
                        // Survivors always carry a valid code; nothing to do.
                        continue;
                    };
                    let side = match decision.decision {
                        DecisionType::Buy => tradefleet_market::Side::Buy,
                        _ => tradefleet_market::Side::Sell,
                    };
                    let quantity = decision.quantity.unwrap_or_default().max(0) as u64;

                    let quote = self.market_data.latest_quote(&code).await.ok();
                    let price = decision
                        .price
                        .or_else(|| quote.as_ref().map(|quote| quote.close));
                    let prev_close = quote
                        .as_ref()
                        .map(|quote| quote.prev_close)
                        .unwrap_or(Decimal::ZERO);

                    let order = Order::market(
                        agent_id,
                        side,
                        code,
                        quantity,
                        price,
                        decision.reason.clone(),
                        llm_log_id,
                        now,
                    );

                    match self.processor.process(order, &portfolio, prev_close, now) {
                        Ok(fill) => {
                            self.repository
                                .persist_fill(
                                    fill.order.clone(),
                                    fill.transaction.clone(),
                                    fill.portfolio.clone(),
                                )
                                .await?;
                            portfolio = fill.portfolio;
                            outcomes.push(OrderOutcome {
                                order: fill.order,
                                transaction: Some(fill.transaction),
                            });
                        }
                        Err(rejection) => {
                            warn!(
                                %agent_id,
                                code = rejection.reason.code(),
                                "order rejected: {}",
                                rejection.reason
                            );
                            self.repository
                                .persist_order(rejection.order.clone())
                                .await?;
                            outcomes.push(OrderOutcome {
                                order: rejection.order,
                                transaction: None,
                            });
                        }
                    }
                }
            }
        }

        Ok(outcomes)
    }
}

#[async_trait]
impl CycleRunner for AgentEngine {
    async fn run_cycle(&self, agent_id: Uuid) -> Result<CycleOutcome, CycleError> {
        AgentEngine::run_cycle(self, agent_id, CycleOverrides::default()).await
    }
}

fn format_quote_line(quote: &Quote) -> String {
    format!(
        "{code} {date}: open {open} high {high} low {low} close {close} prev_close {prev_close} volume {volume}",
        code = quote.stock_code,
        date = quote.trade_date,
        open = quote.open,
        high = quote.high,
        low = quote.low,
        close = quote.close,
        prev_close = quote.prev_close,
        volume = quote.volume,
    )
}

impl std::fmt::Debug for AgentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEngine")
            .field("processor", &self.processor)
            .finish()
    }
}
