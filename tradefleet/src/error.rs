use crate::{
    engine::CycleError, scheduler::SchedulerError, scheduler::cron::CronError,
    store::RepositoryError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradefleet_llm::LlmError;
use tradefleet_market::MarketDataError;

/// Top-level error for callers embedding the whole fleet.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum FleetError {
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error("cycle: {0}")]
    Cycle(#[from] CycleError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("cron: {0}")]
    Cron(#[from] CronError),

    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    #[error("market data: {0}")]
    MarketData(#[from] MarketDataError),
}
