use crate::store::{FleetRepository, RepositoryError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tradefleet_market::calendar::china_now;
use uuid::Uuid;

/// Cron expression parsing, validation, description and next-fire times.
pub mod cron;

/// Task and run-log data structures.
pub mod task;

/// Per-run fan-out over agents.
pub mod executor;

pub use cron::{CronError, CronInfo, CronSpec, cron_validate};
pub use executor::{CoalescePolicy, ExecutorConfig, TaskExecutor, Trigger};
pub use task::{
    AgentRunResult, RunStatus, SystemTask, TargetAgents, TaskRunLog, TaskStatus, TaskType,
};

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Cron(#[from] CronError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("task name must not be empty")]
    EmptyTaskName,
}

/// Fields required to create a task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    pub name: String,
    pub cron_expression: String,
    pub task_type: TaskType,
    pub target_agent_ids: TargetAgents,
    #[serde(default)]
    pub trading_day_only: bool,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Partial update of a stored task; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub task_type: Option<TaskType>,
    pub target_agent_ids: Option<TargetAgents>,
    pub trading_day_only: Option<bool>,
    pub config: Option<serde_json::Value>,
}

/// Process-wide cron scheduler.
///
/// Owns one timer loop per active task; each fire spawns a detached task
/// run, so pausing or deleting a task never aborts an in-flight run - it
/// only suppresses future fires.
pub struct Scheduler {
    repository: Arc<dyn FleetRepository>,
    executor: Arc<TaskExecutor>,
    jobs: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(repository: Arc<dyn FleetRepository>, executor: Arc<TaskExecutor>) -> Self {
        Self {
            repository,
            executor,
            jobs: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Start the scheduler, re-registering every stored active task.
    ///
    /// Missed fires from downtime are not replayed. Returns the number of
    /// registered tasks.
    pub async fn start(&self) -> Result<usize, SchedulerError> {
        let tasks = self.repository.tasks().await?;
        let mut registered = 0;
        for task in &tasks {
            if task.status == TaskStatus::Active {
                self.register(task);
                registered += 1;
            }
        }
        self.running.store(true, Ordering::SeqCst);
        info!(registered, "scheduler started");
        Ok(registered)
    }

    /// Stop all timer loops. In-flight runs keep going to completion.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock();
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
        self.running.store(false, Ordering::SeqCst);
        info!("scheduler shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate and persist a new task, then register its trigger.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<SystemTask, SchedulerError> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(SchedulerError::EmptyTaskName);
        }
        let spec = CronSpec::parse(&draft.cron_expression)?;

        let task = SystemTask {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cron_expression: spec.expression().to_string(),
            task_type: draft.task_type,
            target_agent_ids: draft.target_agent_ids,
            trading_day_only: draft.trading_day_only,
            status: TaskStatus::Active,
            config: draft.config,
            created_at: china_now(),
        };
        self.repository.create_task(task.clone()).await?;
        self.register(&task);
        info!(task = %task.name, id = %task.id, "task created");
        Ok(task)
    }

    /// Apply a partial update; an invalid cron expression rejects the whole
    /// update. Active tasks are re-registered with the new trigger.
    pub async fn update_task(
        &self,
        id: Uuid,
        update: TaskUpdate,
    ) -> Result<SystemTask, SchedulerError> {
        let mut task = self.repository.task(id).await?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(SchedulerError::EmptyTaskName);
            }
            task.name = name;
        }
        if let Some(expression) = update.cron_expression {
            task.cron_expression = CronSpec::parse(&expression)?.expression().to_string();
        }
        if let Some(task_type) = update.task_type {
            task.task_type = task_type;
        }
        if let Some(targets) = update.target_agent_ids {
            task.target_agent_ids = targets;
        }
        if let Some(trading_day_only) = update.trading_day_only {
            task.trading_day_only = trading_day_only;
        }
        if let Some(config) = update.config {
            task.config = Some(config);
        }

        self.repository.update_task(task.clone()).await?;

        self.unregister(id);
        if task.status == TaskStatus::Active {
            self.register(&task);
        }
        Ok(task)
    }

    /// Remove the task and its trigger; historical run logs survive with a
    /// nulled task id.
    pub async fn delete_task(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.unregister(id);
        self.repository.delete_task(id).await?;
        info!(%id, "task deleted");
        Ok(())
    }

    /// Suppress future fires. No effect on an in-flight run.
    pub async fn pause_task(&self, id: Uuid) -> Result<SystemTask, SchedulerError> {
        let mut task = self.repository.task(id).await?;
        if task.status == TaskStatus::Paused {
            return Ok(task);
        }
        task.status = TaskStatus::Paused;
        self.repository.update_task(task.clone()).await?;
        self.unregister(id);
        info!(task = %task.name, "task paused");
        Ok(task)
    }

    /// Re-enable fires; the next fire time is recomputed from now.
    pub async fn resume_task(&self, id: Uuid) -> Result<SystemTask, SchedulerError> {
        let mut task = self.repository.task(id).await?;
        if task.status == TaskStatus::Active {
            return Ok(task);
        }
        task.status = TaskStatus::Active;
        self.repository.update_task(task.clone()).await?;
        self.register(&task);
        info!(task = %task.name, "task resumed");
        Ok(task)
    }

    /// Fire the task immediately. Manual runs are never retried.
    pub async fn trigger(&self, id: Uuid) -> Result<TaskRunLog, SchedulerError> {
        Ok(self.executor.execute_task(id, Trigger::Manual).await?)
    }

    /// Run history, newest first.
    pub async fn run_history(
        &self,
        task_id: Option<Uuid>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<TaskRunLog>, SchedulerError> {
        Ok(self.repository.run_logs(task_id, page, page_size).await?)
    }

    fn register(&self, task: &SystemTask) {
        let spec = match CronSpec::parse(&task.cron_expression) {
            Ok(spec) => spec,
            Err(error) => {
                // Stored tasks are validated on save, so this is defect
                // territory; keep the scheduler alive.
                error!(task = %task.name, %error, "stored cron expression failed to parse");
                return;
            }
        };

        let executor = Arc::clone(&self.executor);
        let task_id = task.id;
        let task_name = task.name.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now = china_now();
                let Some(next) = spec.next_fire(now) else {
                    warn!(task = %task_name, "cron schedule has no future fire times");
                    break;
                };
                let delay = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;

                // Detach the run so pausing the task never cancels it.
                let executor = Arc::clone(&executor);
                let task_name = task_name.clone();
                tokio::spawn(async move {
                    if let Err(error) = executor.execute_task(task_id, Trigger::Cron).await {
                        error!(task = %task_name, %error, "task run could not be recorded");
                    }
                });
            }
        });

        if let Some(previous) = self.jobs.lock().insert(task_id, handle) {
            previous.abort();
        }
    }

    fn unregister(&self, id: Uuid) {
        if let Some(handle) = self.jobs.lock().remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, handle) in self.jobs.lock().drain() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.jobs.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}
