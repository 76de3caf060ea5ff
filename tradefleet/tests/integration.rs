use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tradefleet::{
    agent::{Agent, AgentStatus, ScheduleType},
    engine::{AgentEngine, CycleError, CycleOutcome, CycleOverrides, CycleRunner,
        LlmProviderRegistry},
    order::{OrderSide, OrderStatus},
    portfolio::Portfolio,
    scheduler::{
        CoalescePolicy, ExecutorConfig, RunStatus, Scheduler, SystemTask, TargetAgents, TaskDraft,
        TaskExecutor, TaskStatus, TaskType, Trigger,
    },
    store::{FleetRepository, InMemoryRepository},
};
use tradefleet_llm::{ChatClient, ChatOutcome, ChatRequest, ChatResponse, LlmError};
use tradefleet_market::{FixedQuotes, Quote, StockCode, calendar::{china_now, china_tz}};
use uuid::Uuid;

/// Chat client replaying scripted replies in order.
#[derive(Debug, Default)]
struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedChat {
    fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Connection("script exhausted".to_string()))?;
        Ok(ChatOutcome {
            response: ChatResponse {
                content,
                model: "scripted".to_string(),
                usage: None,
                finish_reason: None,
            },
            log_id: None,
        })
    }
}

fn code(s: &str) -> StockCode {
    StockCode::parse(s).unwrap()
}

fn quote(code_str: &str, close: Decimal, prev_close: Decimal) -> Quote {
    Quote::new(
        code(code_str),
        china_now().date_naive(),
        prev_close,
        close,
        prev_close,
        close,
        prev_close,
        1_000_000,
        dec!(10000000.00),
    )
}

fn agent_row(agent_id: Uuid, initial_cash: Decimal) -> Agent {
    Agent {
        id: agent_id,
        name: "integration-agent".to_string(),
        initial_cash,
        provider_id: Some("provider-1".to_string()),
        model_name: "scripted".to_string(),
        template_id: None,
        schedule_type: ScheduleType::Manual,
        status: AgentStatus::Active,
        created_at: china_now(),
    }
}

struct Harness {
    repository: Arc<InMemoryRepository>,
    engine: AgentEngine,
    agent_id: Uuid,
}

async fn harness(replies: Vec<&str>, quotes: FixedQuotes, initial_cash: Decimal) -> Harness {
    let repository = Arc::new(InMemoryRepository::new());
    let agent_id = Uuid::new_v4();
    repository
        .upsert_agent(agent_row(agent_id, initial_cash))
        .await
        .unwrap();
    repository
        .upsert_portfolio(Portfolio::new(agent_id, initial_cash))
        .await
        .unwrap();

    let providers = Arc::new(LlmProviderRegistry::new());
    providers.register("provider-1", Arc::new(ScriptedChat::new(replies)));

    let engine = AgentEngine::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        providers,
        Arc::new(quotes),
    );

    Harness {
        repository,
        engine,
        agent_id,
    }
}

fn yesterday() -> NaiveDate {
    china_now().date_naive().pred_opt().unwrap()
}

#[tokio::test]
async fn test_accepting_buy_cycle() {
    let mut quotes = FixedQuotes::new();
    quotes.insert(quote("600000", dec!(10.000), dec!(10.00)));

    let reply = r#"```json
{"decision": "buy", "stock_code": "600000", "quantity": 100, "price": 10.000, "reason": "breakout"}
```"#;
    let harness = harness(vec![reply], quotes, dec!(20000.00)).await;

    let outcome = harness
        .engine
        .run_cycle(harness.agent_id, CycleOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.orders.len(), 1);
    let order = &outcome.orders[0].order;
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.side, OrderSide::Buy);

    let transaction = outcome.orders[0].transaction.as_ref().unwrap();
    assert_eq!(transaction.fees.commission, dec!(5.00));
    assert_eq!(transaction.fees.transfer_fee, dec!(0.02));
    assert_eq!(transaction.fees.total(), dec!(5.02));

    let portfolio = harness.repository.portfolio(harness.agent_id).await.unwrap();
    assert_eq!(portfolio.cash, dec!(18994.98));
    let position = portfolio.position(&code("600000")).unwrap();
    assert_eq!(position.shares, 100);
    assert_eq!(position.avg_cost, dec!(10.000));
    assert!(portfolio.check_invariants().is_ok());

    // Exactly one persisted order and one transaction.
    assert_eq!(harness.repository.orders(harness.agent_id).await.unwrap().len(), 1);
    assert_eq!(
        harness
            .repository
            .transactions(harness.agent_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_insufficient_cash_fails_cycle_without_mutation() {
    let mut quotes = FixedQuotes::new();
    quotes.insert(quote("600000", dec!(10.000), dec!(10.00)));

    let reply =
        r#"{"decision": "buy", "stock_code": "600000", "quantity": 100000, "price": 10.000}"#;
    let harness = harness(vec![reply], quotes, dec!(20000.00)).await;

    let error = harness
        .engine
        .run_cycle(harness.agent_id, CycleOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(error, CycleError::AllDecisionsInvalid(_)));
    assert!(error.to_string().contains("insufficient cash"));

    let portfolio = harness.repository.portfolio(harness.agent_id).await.unwrap();
    assert_eq!(portfolio.cash, dec!(20000.00));
    assert!(portfolio.positions.is_empty());
    assert!(harness.repository.orders(harness.agent_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_t_plus_1_rejection_persists_rejected_order() {
    let mut quotes = FixedQuotes::new();
    quotes.insert(quote("000001", dec!(9.100), dec!(9.00)));

    let reply = r#"{"decision": "sell", "stock_code": "000001", "quantity": 100, "price": 9.100}"#;
    let harness = harness(vec![reply], quotes, dec!(20000.00)).await;

    // Bought today: locked by T+1.
    let mut portfolio = harness.repository.portfolio(harness.agent_id).await.unwrap();
    portfolio.apply_buy(code("000001"), 200, dec!(9.000), china_now().date_naive());
    harness.repository.upsert_portfolio(portfolio).await.unwrap();

    let outcome = harness
        .engine
        .run_cycle(harness.agent_id, CycleOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.orders.len(), 1);
    let order = &outcome.orders[0].order;
    assert_eq!(order.status, OrderStatus::Rejected);
    assert!(order.reject_reason.as_ref().unwrap().contains("T+1"));
    assert!(outcome.orders[0].transaction.is_none());

    // Shares untouched.
    let portfolio = harness.repository.portfolio(harness.agent_id).await.unwrap();
    assert_eq!(portfolio.position(&code("000001")).unwrap().shares, 200);
    assert!(harness
        .repository
        .transactions(harness.agent_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_chinext_limit_drops_decision() {
    let mut quotes = FixedQuotes::new();
    quotes.insert(quote("300123", dec!(10.000), dec!(10.00)));

    let reply = r#"{"decision": "buy", "stock_code": "300123", "quantity": 100, "price": 12.01}"#;
    let harness = harness(vec![reply], quotes, dec!(50000.00)).await;

    let error = harness
        .engine
        .run_cycle(harness.agent_id, CycleOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(error, CycleError::AllDecisionsInvalid(_)));
    assert!(error.to_string().contains("above upper limit"));
}

#[tokio::test]
async fn test_empty_array_persists_single_hold_order() {
    let harness = harness(vec!["[]"], FixedQuotes::new(), dec!(20000.00)).await;

    let outcome = harness
        .engine
        .run_cycle(harness.agent_id, CycleOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.orders.len(), 1);
    let order = &outcome.orders[0].order;
    assert_eq!(order.side, OrderSide::Hold);
    assert!(order.stock_code.is_none());
    assert!(order.price.is_none());
    assert!(order.quantity.is_none());
    assert!(outcome.orders[0].transaction.is_none());

    assert_eq!(harness.repository.orders(harness.agent_id).await.unwrap().len(), 1);
    assert!(harness
        .repository
        .transactions(harness.agent_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_mixed_decisions_survivors_execute_in_order() {
    let mut quotes = FixedQuotes::new();
    quotes.insert(quote("600000", dec!(10.000), dec!(10.00)));
    quotes.insert(quote("000001", dec!(9.100), dec!(9.00)));

    let reply = r#"[
        {"decision": "buy", "stock_code": "600000", "quantity": 100, "price": 10.000},
        {"decision": "buy", "stock_code": "999999", "quantity": 100, "price": 1.00},
        {"decision": "sell", "stock_code": "000001", "quantity": 100, "price": 9.100}
    ]"#;
    let harness = harness(vec![reply], quotes, dec!(20000.00)).await;

    // Sellable position bought yesterday.
    let mut portfolio = harness.repository.portfolio(harness.agent_id).await.unwrap();
    portfolio.apply_buy(code("000001"), 200, dec!(9.000), yesterday());
    harness.repository.upsert_portfolio(portfolio).await.unwrap();

    let outcome = harness
        .engine
        .run_cycle(harness.agent_id, CycleOverrides::default())
        .await
        .unwrap();

    // The invalid-code decision was dropped; survivors ran in list order.
    assert_eq!(outcome.orders.len(), 2);
    assert_eq!(outcome.orders[0].order.side, OrderSide::Buy);
    assert_eq!(outcome.orders[1].order.side, OrderSide::Sell);
    assert!(outcome.orders.iter().all(|o| o.transaction.is_some()));

    // 20000 - 1000 - 5.02 + 910 - 5.91 = 19899.07
    let portfolio = harness.repository.portfolio(harness.agent_id).await.unwrap();
    assert_eq!(portfolio.cash, dec!(19899.07));
    assert_eq!(portfolio.position(&code("000001")).unwrap().shares, 100);
    assert!(portfolio.check_invariants().is_ok());

    // Every filled trade order has exactly one transaction.
    let orders = harness.repository.orders(harness.agent_id).await.unwrap();
    let transactions = harness.repository.transactions(harness.agent_id).await.unwrap();
    let filled_trades = orders
        .iter()
        .filter(|o| o.status == OrderStatus::Filled && o.side != OrderSide::Hold)
        .count();
    assert_eq!(filled_trades, transactions.len());
}

/// Cycle runner counting concurrent executions.
#[derive(Debug, Default)]
struct CountingRunner {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

#[async_trait]
impl CycleRunner for CountingRunner {
    async fn run_cycle(&self, agent_id: Uuid) -> Result<CycleOutcome, CycleError> {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(CycleOutcome {
            agent_id,
            llm_log_id: None,
            orders: Vec::new(),
            raw_response: String::new(),
        })
    }
}

/// Cycle runner failing a fixed number of times before succeeding.
#[derive(Debug)]
struct FlakyRunner {
    failures_left: AtomicUsize,
}

#[async_trait]
impl CycleRunner for FlakyRunner {
    async fn run_cycle(&self, agent_id: Uuid) -> Result<CycleOutcome, CycleError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(CycleError::Unparseable);
        }
        Ok(CycleOutcome {
            agent_id,
            llm_log_id: None,
            orders: Vec::new(),
            raw_response: String::new(),
        })
    }
}

async fn seeded_repository(active_agents: usize) -> (Arc<InMemoryRepository>, Vec<Uuid>) {
    let repository = Arc::new(InMemoryRepository::new());
    let mut ids = Vec::with_capacity(active_agents);
    for _ in 0..active_agents {
        let agent_id = Uuid::new_v4();
        repository
            .upsert_agent(agent_row(agent_id, dec!(20000.00)))
            .await
            .unwrap();
        ids.push(agent_id);
    }
    (repository, ids)
}

fn draft(name: &str, trading_day_only: bool) -> TaskDraft {
    TaskDraft {
        name: name.to_string(),
        cron_expression: "*/15 * * * *".to_string(),
        task_type: TaskType::AgentDecision,
        target_agent_ids: TargetAgents::All,
        trading_day_only,
        config: None,
    }
}

fn saturday_morning() -> DateTime<FixedOffset> {
    china_tz().with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
}

#[tokio::test]
async fn test_trading_day_gate_skips_weekend_run() {
    let (repository, _ids) = seeded_repository(3).await;
    let runner = Arc::new(CountingRunner::default());

    let executor = Arc::new(
        TaskExecutor::new(
            Arc::clone(&repository) as Arc<dyn FleetRepository>,
            Arc::clone(&runner) as Arc<dyn CycleRunner>,
            ExecutorConfig::default(),
        )
        .with_clock(saturday_morning),
    );
    let scheduler = Scheduler::new(Arc::clone(&repository) as Arc<dyn FleetRepository>, executor);

    let task = scheduler.create_task(draft("gated", true)).await.unwrap();
    let log = scheduler.trigger(task.id).await.unwrap();

    assert_eq!(log.status, RunStatus::Skipped);
    assert_eq!(log.skip_reason.as_deref(), Some("weekend"));
    assert!(log.agent_results.is_empty());
    // No cycles, hence no LLM traffic.
    assert_eq!(runner.total.load(Ordering::SeqCst), 0);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_fan_out_bounded_by_worker_pool() {
    let (repository, ids) = seeded_repository(10).await;
    let runner = Arc::new(CountingRunner::default());

    let executor = TaskExecutor::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::clone(&runner) as Arc<dyn CycleRunner>,
        ExecutorConfig::default(),
    );
    let scheduler = Scheduler::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::new(executor),
    );

    let task = scheduler.create_task(draft("fan-out", false)).await.unwrap();
    let log = scheduler.trigger(task.id).await.unwrap();

    assert_eq!(log.status, RunStatus::Success);
    assert_eq!(log.agent_results.len(), ids.len());
    assert!(log
        .agent_results
        .iter()
        .all(|result| result.status == RunStatus::Success));
    assert_eq!(runner.total.load(Ordering::SeqCst), ids.len());
    assert!(runner.peak.load(Ordering::SeqCst) <= 5);

    // Run history records exactly this run, completed after it started.
    let history = scheduler.run_history(Some(task.id), 0, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].completed_at.unwrap() >= history[0].started_at);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_explicit_targets_record_missing_agents_as_skipped() {
    let (repository, ids) = seeded_repository(1).await;
    let missing = Uuid::new_v4();
    let runner = Arc::new(CountingRunner::default());

    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::clone(&runner) as Arc<dyn CycleRunner>,
        ExecutorConfig::default(),
    ));
    let scheduler = Scheduler::new(Arc::clone(&repository) as Arc<dyn FleetRepository>, executor);

    let mut draft = draft("explicit", false);
    draft.target_agent_ids = TargetAgents::Explicit(vec![ids[0], missing]);
    let task = scheduler.create_task(draft).await.unwrap();
    let log = scheduler.trigger(task.id).await.unwrap();

    assert_eq!(log.status, RunStatus::Success);
    assert_eq!(log.agent_results.len(), 2);

    let skipped = log
        .agent_results
        .iter()
        .find(|result| result.agent_id == missing)
        .unwrap();
    assert_eq!(skipped.status, RunStatus::Skipped);
    assert_eq!(skipped.error_message.as_deref(), Some("agent not found"));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_automatic_runs_retry_and_manual_runs_do_not() {
    let (repository, _ids) = seeded_repository(1).await;

    let config = ExecutorConfig {
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
        ..ExecutorConfig::default()
    };

    let task = SystemTask {
        id: Uuid::new_v4(),
        name: "retries".to_string(),
        cron_expression: "*/15 * * * *".to_string(),
        task_type: TaskType::AgentDecision,
        target_agent_ids: TargetAgents::All,
        trading_day_only: false,
        status: TaskStatus::Active,
        config: None,
        created_at: china_now(),
    };
    repository.create_task(task.clone()).await.unwrap();
    let task_id = task.id;

    // Fails once, then succeeds: a cron run retries to success.
    let executor = TaskExecutor::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::new(FlakyRunner {
            failures_left: AtomicUsize::new(1),
        }),
        config.clone(),
    );

    let log = executor.execute_task(task_id, Trigger::Cron).await.unwrap();
    assert_eq!(log.status, RunStatus::Success);
    assert_eq!(log.agent_results[0].retries, 1);

    // Always failing: a manual run fails immediately with zero retries.
    let executor = TaskExecutor::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::new(FlakyRunner {
            failures_left: AtomicUsize::new(usize::MAX),
        }),
        config,
    );
    let log = executor.execute_task(task_id, Trigger::Manual).await.unwrap();
    assert_eq!(log.status, RunStatus::Failed);
    assert_eq!(log.agent_results[0].retries, 0);
    assert!(log.agent_results[0].error_message.is_some());
}

#[tokio::test]
async fn test_deadline_cancels_slow_cycle() {
    let (repository, _ids) = seeded_repository(1).await;

    #[derive(Debug)]
    struct StuckRunner;

    #[async_trait]
    impl CycleRunner for StuckRunner {
        async fn run_cycle(&self, _agent_id: Uuid) -> Result<CycleOutcome, CycleError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("the deadline should have fired")
        }
    }

    let config = ExecutorConfig {
        agent_deadline: Duration::from_millis(50),
        ..ExecutorConfig::default()
    };
    let executor = TaskExecutor::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::new(StuckRunner),
        config,
    );
    let scheduler = Scheduler::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::new(executor),
    );

    let task = scheduler.create_task(draft("deadline", false)).await.unwrap();
    let log = scheduler.trigger(task.id).await.unwrap();

    assert_eq!(log.status, RunStatus::Failed);
    assert!(log.agent_results[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("deadline"));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_overlapping_fires_for_one_agent_are_dropped() {
    let (repository, _ids) = seeded_repository(1).await;

    #[derive(Debug)]
    struct SlowRunner;

    #[async_trait]
    impl CycleRunner for SlowRunner {
        async fn run_cycle(&self, agent_id: Uuid) -> Result<CycleOutcome, CycleError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(CycleOutcome {
                agent_id,
                llm_log_id: None,
                orders: Vec::new(),
                raw_response: String::new(),
            })
        }
    }

    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::new(SlowRunner),
        ExecutorConfig {
            coalesce: CoalescePolicy::Drop,
            ..ExecutorConfig::default()
        },
    ));
    let scheduler = Scheduler::new(
        Arc::clone(&repository) as Arc<dyn FleetRepository>,
        Arc::clone(&executor),
    );
    let task = scheduler.create_task(draft("coalesce", false)).await.unwrap();

    let first = {
        let executor = Arc::clone(&executor);
        let task_id = task.id;
        tokio::spawn(async move { executor.execute_task(task_id, Trigger::Manual).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = executor.execute_task(task.id, Trigger::Manual).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(second.agent_results[0].status, RunStatus::Skipped);
    assert_eq!(
        second.agent_results[0].error_message.as_deref(),
        Some("overlapping cycle in progress")
    );

    scheduler.shutdown();
}
