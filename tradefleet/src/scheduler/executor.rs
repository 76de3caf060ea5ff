use super::task::{AgentRunResult, RunStatus, SystemTask, TargetAgents, TaskRunLog, TaskType};
use crate::{
    engine::CycleRunner,
    store::{FleetRepository, RepositoryError},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex as AsyncMutex, OwnedMutexGuard, Semaphore},
    task::JoinSet,
};
use tracing::{error, info, warn};
use tradefleet_market::{calendar::china_now, rules};
use uuid::Uuid;

/// How a task run was initiated. Only cron-initiated runs retry failed
/// agents.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Trigger {
    Cron,
    Manual,
}

/// What happens when a fire targets an agent whose previous cycle is still
/// in flight.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoalescePolicy {
    /// Record the overlapping fire as skipped.
    #[default]
    Drop,
    /// Wait for the running cycle, then run.
    Queue,
}

/// Task-executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrent agent cycles per run.
    pub max_workers: usize,
    /// Retries per failed agent on automatic runs.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Wall-clock budget per agent cycle attempt.
    pub agent_deadline: Duration,
    pub coalesce: CoalescePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
            agent_deadline: tradefleet_llm::DEFAULT_TIMEOUT,
            coalesce: CoalescePolicy::default(),
        }
    }
}

/// Hook for non-agent task types (quote sync, market refresh), fulfilled by
/// the market-data collectors.
#[async_trait]
pub trait MaintenanceRunner: Send + Sync {
    async fn run(&self, task: &SystemTask) -> Result<(), String>;
}

/// Executes one task run: trading-window gating, target expansion, bounded
/// concurrent fan-out over agents, per-agent deadline and retries, and the
/// structured run log.
pub struct TaskExecutor {
    repository: Arc<dyn FleetRepository>,
    runner: Arc<dyn CycleRunner>,
    maintenance: Option<Arc<dyn MaintenanceRunner>>,
    config: ExecutorConfig,
    workers: Arc<Semaphore>,
    /// Per-agent coalescing guards: at most one cycle per agent at a time.
    guards: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    /// Wall-clock source for gating and run timestamps; swappable in tests.
    clock: fn() -> chrono::DateTime<chrono::FixedOffset>,
}

impl TaskExecutor {
    pub fn new(
        repository: Arc<dyn FleetRepository>,
        runner: Arc<dyn CycleRunner>,
        config: ExecutorConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            repository,
            runner,
            maintenance: None,
            config,
            workers,
            guards: Mutex::new(HashMap::new()),
            clock: china_now,
        }
    }

    pub fn with_maintenance(mut self, maintenance: Arc<dyn MaintenanceRunner>) -> Self {
        self.maintenance = Some(maintenance);
        self
    }

    pub fn with_clock(mut self, clock: fn() -> chrono::DateTime<chrono::FixedOffset>) -> Self {
        self.clock = clock;
        self
    }

    /// Execute one run of `task_id`, recording a [`TaskRunLog`] from start
    /// to its terminal status.
    pub async fn execute_task(
        &self,
        task_id: Uuid,
        trigger: Trigger,
    ) -> Result<TaskRunLog, RepositoryError> {
        let task = self.repository.task(task_id).await?;
        let started_at = (self.clock)();
        let mut log = TaskRunLog::started(task_id, started_at);
        self.repository.append_run_log(log.clone()).await?;

        if task.trading_day_only && !rules::is_trading_time(started_at) {
            let reason = if rules::is_trading_day(started_at.date_naive()) {
                "outside trading hours"
            } else {
                "weekend"
            };
            info!(task = %task.name, reason, "task run skipped by trading-window gate");
            log.status = RunStatus::Skipped;
            log.skip_reason = Some(reason.to_string());
            log.completed_at = Some((self.clock)());
            self.repository.update_run_log(log.clone()).await?;
            return Ok(log);
        }

        match task.task_type {
            TaskType::AgentDecision => self.fan_out(&task, trigger, &mut log).await?,
            TaskType::QuoteSync | TaskType::MarketRefresh => {
                self.run_maintenance(&task, &mut log).await;
            }
        }

        log.completed_at = Some((self.clock)());
        self.repository.update_run_log(log.clone()).await?;
        info!(
            task = %task.name,
            status = %log.status,
            agents = log.agent_results.len(),
            "task run complete"
        );
        Ok(log)
    }

    /// Dispatch the task's agents onto the bounded worker pool and collect
    /// their results.
    async fn fan_out(
        &self,
        task: &SystemTask,
        trigger: Trigger,
        log: &mut TaskRunLog,
    ) -> Result<(), RepositoryError> {
        let (dispatch, mut results) = self.expand_targets(task).await?;
        let retries_allowed = trigger == Trigger::Cron;

        let mut join_set = JoinSet::new();
        for agent_id in dispatch {
            let runner = Arc::clone(&self.runner);
            let workers = Arc::clone(&self.workers);
            let guard = self.guard_for(agent_id);
            let config = self.config.clone();
            join_set.spawn(async move {
                run_agent(runner, workers, guard, agent_id, config, retries_allowed).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_error) => error!(%join_error, "agent cycle task panicked"),
            }
        }
        results.sort_by_key(|result| result.started_at);

        log.status = if results
            .iter()
            .any(|result| result.status == RunStatus::Failed)
        {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        log.error_message = results
            .iter()
            .find(|result| result.status == RunStatus::Failed)
            .and_then(|result| result.error_message.clone());
        log.agent_results = results;
        Ok(())
    }

    async fn run_maintenance(&self, task: &SystemTask, log: &mut TaskRunLog) {
        match &self.maintenance {
            Some(maintenance) => match maintenance.run(task).await {
                Ok(()) => log.status = RunStatus::Success,
                Err(message) => {
                    warn!(task = %task.name, %message, "maintenance task failed");
                    log.status = RunStatus::Failed;
                    log.error_message = Some(message);
                }
            },
            None => {
                log.status = RunStatus::Skipped;
                log.skip_reason = Some("no maintenance runner registered".to_string());
            }
        }
    }

    /// `["all"]` expands to the active agents; explicit lists record
    /// missing or inactive entries as per-agent skips.
    async fn expand_targets(
        &self,
        task: &SystemTask,
    ) -> Result<(Vec<Uuid>, Vec<AgentRunResult>), RepositoryError> {
        match &task.target_agent_ids {
            TargetAgents::All => {
                let agents = self.repository.active_agents().await?;
                Ok((agents.into_iter().map(|agent| agent.id).collect(), Vec::new()))
            }
            TargetAgents::Explicit(ids) => {
                let mut dispatch = Vec::with_capacity(ids.len());
                let mut skipped = Vec::new();
                for &agent_id in ids {
                    match self.repository.agent(agent_id).await {
                        Ok(agent) if agent.is_active() => dispatch.push(agent_id),
                        Ok(_) => skipped.push(skip_result(agent_id, "agent not active")),
                        Err(RepositoryError::AgentNotFound(_)) => {
                            skipped.push(skip_result(agent_id, "agent not found"));
                        }
                        Err(error) => return Err(error),
                    }
                }
                Ok((dispatch, skipped))
            }
        }
    }

    fn guard_for(&self, agent_id: Uuid) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.guards
                .lock()
                .entry(agent_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

/// Run one agent's cycle with coalescing, a worker permit, a deadline and
/// (for automatic runs) retries.
async fn run_agent(
    runner: Arc<dyn CycleRunner>,
    workers: Arc<Semaphore>,
    guard: Arc<AsyncMutex<()>>,
    agent_id: Uuid,
    config: ExecutorConfig,
    retries_allowed: bool,
) -> AgentRunResult {
    let started_at = china_now();

    let _guard: OwnedMutexGuard<()> = match config.coalesce {
        CoalescePolicy::Drop => match guard.try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!(%agent_id, "overlapping cycle dropped by coalescing guard");
                return skip_result(agent_id, "overlapping cycle in progress");
            }
        },
        CoalescePolicy::Queue => guard.lock_owned().await,
    };

    let _permit = match Arc::clone(&workers).acquire_owned().await {
        Ok(permit) => permit,
        Err(_closed) => {
            return failed_result(agent_id, started_at, 0, "worker pool shut down".to_string());
        }
    };

    let mut retries = 0;
    loop {
        let attempt_error =
            match tokio::time::timeout(config.agent_deadline, runner.run_cycle(agent_id)).await {
                Ok(Ok(_outcome)) => None,
                Ok(Err(cycle_error)) => Some(cycle_error.to_string()),
                Err(_elapsed) => Some(format!(
                    "cycle deadline of {}s exceeded",
                    config.agent_deadline.as_secs()
                )),
            };

        match attempt_error {
            None => {
                let completed_at = china_now();
                return AgentRunResult {
                    agent_id,
                    status: RunStatus::Success,
                    started_at,
                    completed_at: Some(completed_at),
                    duration_ms: duration_ms(started_at, completed_at),
                    error_message: None,
                    retries,
                };
            }
            Some(message) => {
                if retries_allowed && retries < config.max_retries {
                    retries += 1;
                    warn!(
                        %agent_id,
                        retry = retries,
                        max = config.max_retries,
                        "agent cycle failed, retrying after {}s: {message}",
                        config.retry_delay.as_secs()
                    );
                    tokio::time::sleep(config.retry_delay).await;
                    continue;
                }
                error!(%agent_id, retries, "agent cycle failed: {message}");
                return failed_result(agent_id, started_at, retries, message);
            }
        }
    }
}

fn skip_result(agent_id: Uuid, reason: &str) -> AgentRunResult {
    let now = china_now();
    AgentRunResult {
        agent_id,
        status: RunStatus::Skipped,
        started_at: now,
        completed_at: Some(now),
        duration_ms: Some(0),
        error_message: Some(reason.to_string()),
        retries: 0,
    }
}

fn failed_result(
    agent_id: Uuid,
    started_at: chrono::DateTime<chrono::FixedOffset>,
    retries: u32,
    message: String,
) -> AgentRunResult {
    let completed_at = china_now();
    AgentRunResult {
        agent_id,
        status: RunStatus::Failed,
        started_at,
        completed_at: Some(completed_at),
        duration_ms: duration_ms(started_at, completed_at),
        error_message: Some(message),
        retries,
    }
}

fn duration_ms(
    started_at: chrono::DateTime<chrono::FixedOffset>,
    completed_at: chrono::DateTime<chrono::FixedOffset>,
) -> Option<u64> {
    (completed_at - started_at).num_milliseconds().try_into().ok()
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("config", &self.config)
            .finish()
    }
}
