use super::{FleetRepository, RepositoryError};
use crate::{
    agent::Agent,
    order::{Order, Transaction},
    portfolio::Portfolio,
    scheduler::task::{SystemTask, TaskRunLog},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tradefleet_llm::{LlmLog, LlmLogId, LlmLogSink};
use uuid::Uuid;

/// In-memory store used by tests and dry runs. Thread-safe behind a single
/// lock, so each write (including `persist_fill`) is atomic with respect to
/// readers. Not durable across restarts.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
    llm_log_seq: AtomicI64,
}

#[derive(Debug, Default)]
struct State {
    agents: HashMap<Uuid, Agent>,
    portfolios: HashMap<Uuid, Portfolio>,
    orders: Vec<Order>,
    transactions: Vec<Transaction>,
    tasks: HashMap<Uuid, SystemTask>,
    run_logs: Vec<TaskRunLog>,
    llm_logs: Vec<(LlmLogId, LlmLog)>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded LLM logs, in append order.
    pub fn llm_logs(&self) -> Vec<(LlmLogId, LlmLog)> {
        self.state.read().llm_logs.clone()
    }
}

impl LlmLogSink for InMemoryRepository {
    fn record(&self, log: LlmLog) -> LlmLogId {
        let id = self.llm_log_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.write().llm_logs.push((id, log));
        id
    }
}

#[async_trait]
impl FleetRepository for InMemoryRepository {
    async fn agent(&self, id: Uuid) -> Result<Agent, RepositoryError> {
        self.state
            .read()
            .agents
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::AgentNotFound(id))
    }

    async fn active_agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        let mut agents = self
            .state
            .read()
            .agents
            .values()
            .filter(|agent| agent.is_active())
            .cloned()
            .collect::<Vec<_>>();
        agents.sort_by_key(|agent| agent.created_at);
        Ok(agents)
    }

    async fn upsert_agent(&self, agent: Agent) -> Result<(), RepositoryError> {
        self.state.write().agents.insert(agent.id, agent);
        Ok(())
    }

    async fn portfolio(&self, agent_id: Uuid) -> Result<Portfolio, RepositoryError> {
        self.state
            .read()
            .portfolios
            .get(&agent_id)
            .cloned()
            .ok_or(RepositoryError::PortfolioNotFound(agent_id))
    }

    async fn upsert_portfolio(&self, portfolio: Portfolio) -> Result<(), RepositoryError> {
        self.state
            .write()
            .portfolios
            .insert(portfolio.agent_id, portfolio);
        Ok(())
    }

    async fn persist_order(&self, order: Order) -> Result<(), RepositoryError> {
        self.state.write().orders.push(order);
        Ok(())
    }

    async fn persist_fill(
        &self,
        order: Order,
        transaction: Transaction,
        portfolio: Portfolio,
    ) -> Result<(), RepositoryError> {
        // One write-lock scope keeps the three mutations atomic.
        let mut state = self.state.write();
        state.orders.push(order);
        state.transactions.push(transaction);
        state.portfolios.insert(portfolio.agent_id, portfolio);
        Ok(())
    }

    async fn orders(&self, agent_id: Uuid) -> Result<Vec<Order>, RepositoryError> {
        let mut orders = self
            .state
            .read()
            .orders
            .iter()
            .filter(|order| order.agent_id == agent_id)
            .cloned()
            .collect::<Vec<_>>();
        orders.reverse();
        Ok(orders)
    }

    async fn transactions(&self, agent_id: Uuid) -> Result<Vec<Transaction>, RepositoryError> {
        let mut transactions = self
            .state
            .read()
            .transactions
            .iter()
            .filter(|transaction| transaction.agent_id == agent_id)
            .cloned()
            .collect::<Vec<_>>();
        transactions.reverse();
        Ok(transactions)
    }

    async fn create_task(&self, task: SystemTask) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state
            .tasks
            .values()
            .any(|existing| existing.name == task.name)
        {
            return Err(RepositoryError::DuplicateTaskName(task.name));
        }
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn update_task(&self, task: SystemTask) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if !state.tasks.contains_key(&task.id) {
            return Err(RepositoryError::TaskNotFound(task.id));
        }
        if state
            .tasks
            .values()
            .any(|existing| existing.id != task.id && existing.name == task.name)
        {
            return Err(RepositoryError::DuplicateTaskName(task.name));
        }
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.tasks.remove(&id).is_none() {
            return Err(RepositoryError::TaskNotFound(id));
        }
        for log in &mut state.run_logs {
            if log.task_id == Some(id) {
                log.task_id = None;
            }
        }
        Ok(())
    }

    async fn task(&self, id: Uuid) -> Result<SystemTask, RepositoryError> {
        self.state
            .read()
            .tasks
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::TaskNotFound(id))
    }

    async fn tasks(&self) -> Result<Vec<SystemTask>, RepositoryError> {
        let mut tasks = self.state.read().tasks.values().cloned().collect::<Vec<_>>();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    async fn append_run_log(&self, log: TaskRunLog) -> Result<(), RepositoryError> {
        self.state.write().run_logs.push(log);
        Ok(())
    }

    async fn update_run_log(&self, log: TaskRunLog) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        match state.run_logs.iter_mut().find(|stored| stored.id == log.id) {
            Some(stored) => {
                *stored = log;
                Ok(())
            }
            None => Err(RepositoryError::RunLogNotFound(log.id)),
        }
    }

    async fn run_logs(
        &self,
        task_id: Option<Uuid>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<TaskRunLog>, RepositoryError> {
        let state = self.state.read();
        let mut logs = state
            .run_logs
            .iter()
            .filter(|log| task_id.is_none() || log.task_id == task_id)
            .cloned()
            .collect::<Vec<_>>();
        logs.reverse();
        Ok(logs
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::{RunStatus, TargetAgents, TaskStatus, TaskType};
    use tradefleet_market::calendar::china_now;

    fn task(name: &str) -> SystemTask {
        SystemTask {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cron_expression: "0 9 * * *".to_string(),
            task_type: TaskType::AgentDecision,
            target_agent_ids: TargetAgents::All,
            trading_day_only: true,
            status: TaskStatus::Active,
            config: None,
            created_at: china_now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_task_name_rejected() {
        let store = InMemoryRepository::new();
        store.create_task(task("sync")).await.unwrap();
        assert_eq!(
            store.create_task(task("sync")).await,
            Err(RepositoryError::DuplicateTaskName("sync".to_string()))
        );
    }

    #[tokio::test]
    async fn test_delete_task_nulls_run_log_task_id() {
        let store = InMemoryRepository::new();
        let task = task("decisions");
        let task_id = task.id;
        store.create_task(task).await.unwrap();

        let mut log = TaskRunLog::started(task_id, china_now());
        log.status = RunStatus::Success;
        store.append_run_log(log.clone()).await.unwrap();

        store.delete_task(task_id).await.unwrap();

        let logs = store.run_logs(None, 0, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].task_id, None);
        // The log itself survives the delete.
        assert_eq!(logs[0].status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_llm_log_ids_are_monotonic() {
        use tradefleet_llm::{LlmCallStatus, LlmLog};

        let store = InMemoryRepository::new();
        let log = LlmLog {
            provider_id: "p1".to_string(),
            model_name: "m".to_string(),
            agent_id: None,
            request_body: "{}".to_string(),
            response_body: None,
            duration_ms: 1,
            status: LlmCallStatus::Success,
            error_message: None,
            tokens_in: None,
            tokens_out: None,
            request_time: china_now(),
        };

        let first = store.record(log.clone());
        let second = store.record(log);
        assert!(second > first);
        assert_eq!(store.llm_logs().len(), 2);
    }

    #[tokio::test]
    async fn test_run_log_paging_newest_first() {
        let store = InMemoryRepository::new();
        let task = task("paged");
        let task_id = task.id;
        store.create_task(task).await.unwrap();

        for _ in 0..5 {
            store
                .append_run_log(TaskRunLog::started(task_id, china_now()))
                .await
                .unwrap();
        }

        let first_page = store.run_logs(Some(task_id), 0, 2).await.unwrap();
        let second_page = store.run_logs(Some(task_id), 1, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(second_page.len(), 2);
        assert_ne!(first_page[0].id, second_page[0].id);
    }
}
