//! # Tradefleet
//! A fleet of autonomous, LLM-driven A-share paper-trading agents under one
//! cron scheduler and one persistent store.
//!
//! ## Decision cycle
//! [`engine::AgentEngine`] runs one cycle per agent per trigger: load the
//! agent and its [`portfolio::Portfolio`], assemble a
//! [`engine::PromptContext`], call the provider through `tradefleet-llm`,
//! parse the reply into [`decision::TradingDecision`]s, validate each
//! against the `tradefleet-market` rules, then hand survivors to the
//! [`execution::OrderProcessor`] strictly in order - every fill consumes
//! from the same cash pool.
//!
//! ## Scheduling
//! [`scheduler::Scheduler`] owns one cron trigger per active
//! [`scheduler::SystemTask`] and dispatches runs to the
//! [`scheduler::TaskExecutor`]: trading-window gating, bounded concurrent
//! fan-out over agents, per-agent deadlines, retries for automatic runs and
//! a structured [`scheduler::TaskRunLog`] per run.
//!
//! ## Persistence
//! Everything durable flows through [`store::FleetRepository`];
//! [`store::InMemoryRepository`] backs tests and dry runs. One fill (order +
//! transaction + portfolio) persists as a single atomic unit.

/// Agent identity, status and decision cadence.
pub mod agent;

/// LLM reply parsing into validated trading decisions.
pub mod decision;

/// The per-agent decision cycle.
pub mod engine;

/// Top-level error aggregation.
pub mod error;

/// End-to-end order validation and portfolio state transitions.
pub mod execution;

/// Logging bootstrap.
pub mod logging;

/// Persisted orders and transaction receipts.
pub mod order;

/// Cash, positions, sufficiency checks and performance metrics.
pub mod portfolio;

/// Cron triggers, task runs and concurrent agent fan-out.
pub mod scheduler;

/// The repository contract and its in-memory implementation.
pub mod store;

pub use error::FleetError;
