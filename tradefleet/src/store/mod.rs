use crate::{
    agent::Agent,
    order::{Order, Transaction},
    portfolio::Portfolio,
    scheduler::task::{SystemTask, TaskRunLog},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// In-memory [`FleetRepository`] implementation.
pub mod memory;

pub use memory::InMemoryRepository;

/// Storage failure surfaced to the pipeline.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum RepositoryError {
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("portfolio not found for agent {0}")]
    PortfolioNotFound(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task name already exists: {0}")]
    DuplicateTaskName(String),

    #[error("run log not found: {0}")]
    RunLogNotFound(Uuid),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The persistent store driven by the decision pipeline and the scheduler.
///
/// `persist_fill` commits an order, its transaction and the updated
/// portfolio as one atomic unit; a failure leaves all three unchanged.
/// Earlier fills of the same cycle that already committed stay committed.
#[async_trait]
pub trait FleetRepository: Send + Sync {
    async fn agent(&self, id: Uuid) -> Result<Agent, RepositoryError>;
    async fn active_agents(&self) -> Result<Vec<Agent>, RepositoryError>;
    async fn upsert_agent(&self, agent: Agent) -> Result<(), RepositoryError>;

    async fn portfolio(&self, agent_id: Uuid) -> Result<Portfolio, RepositoryError>;
    async fn upsert_portfolio(&self, portfolio: Portfolio) -> Result<(), RepositoryError>;

    /// Persist a rejected or hold order (no portfolio change, no transaction).
    async fn persist_order(&self, order: Order) -> Result<(), RepositoryError>;

    /// Persist a fill atomically: the filled order, its transaction and the
    /// post-trade portfolio.
    async fn persist_fill(
        &self,
        order: Order,
        transaction: Transaction,
        portfolio: Portfolio,
    ) -> Result<(), RepositoryError>;

    /// Orders of one agent, newest first.
    async fn orders(&self, agent_id: Uuid) -> Result<Vec<Order>, RepositoryError>;

    /// Transactions of one agent, newest first.
    async fn transactions(&self, agent_id: Uuid) -> Result<Vec<Transaction>, RepositoryError>;

    /// Create a task; fails on duplicate name.
    async fn create_task(&self, task: SystemTask) -> Result<(), RepositoryError>;

    /// Replace a stored task; fails when the new name collides with another
    /// task.
    async fn update_task(&self, task: SystemTask) -> Result<(), RepositoryError>;

    /// Delete a task, nulling `task_id` on its historical run logs.
    async fn delete_task(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn task(&self, id: Uuid) -> Result<SystemTask, RepositoryError>;
    async fn tasks(&self) -> Result<Vec<SystemTask>, RepositoryError>;

    async fn append_run_log(&self, log: TaskRunLog) -> Result<(), RepositoryError>;
    async fn update_run_log(&self, log: TaskRunLog) -> Result<(), RepositoryError>;

    /// Run logs, newest first, optionally filtered by task. `page` is
    /// zero-based.
    async fn run_logs(
        &self,
        task_id: Option<Uuid>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<TaskRunLog>, RepositoryError>;
}
