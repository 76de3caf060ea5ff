use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize, de::Error as _};
use uuid::Uuid;

/// What a scheduled task does when it fires.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[display("agent_decision")]
    AgentDecision,
    #[display("quote_sync")]
    QuoteSync,
    #[display("market_refresh")]
    MarketRefresh,
}

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[display("active")]
    Active,
    #[display("paused")]
    Paused,
}

/// Terminal and in-flight states of one task run or one per-agent result.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[display("running")]
    Running,
    #[display("success")]
    Success,
    #[display("failed")]
    Failed,
    #[display("skipped")]
    Skipped,
}

/// Which agents a task fans out to: every active agent, or an explicit list.
///
/// Serialized as `["all"]` or a list of agent ids, matching the stored
/// column format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TargetAgents {
    All,
    Explicit(Vec<Uuid>),
}

impl Serialize for TargetAgents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::All => vec!["all".to_string()].serialize(serializer),
            Self::Explicit(ids) => ids
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TargetAgents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        if raw.iter().any(|entry| entry == "all") {
            return Ok(Self::All);
        }
        raw.iter()
            .map(|entry| Uuid::parse_str(entry).map_err(D::Error::custom))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Explicit)
    }
}

/// A scheduled system task: one cron trigger fanning out to agents (or the
/// market-data jobs) when it fires.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SystemTask {
    pub id: Uuid,
    pub name: String,
    pub cron_expression: String,
    pub task_type: TaskType,
    pub target_agent_ids: TargetAgents,
    /// When true, fires outside trading sessions skip the whole run.
    pub trading_day_only: bool,
    pub status: TaskStatus,
    /// Opaque task-type-specific configuration.
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<FixedOffset>,
}

/// Result of one agent's cycle inside a task run.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct AgentRunResult {
    pub agent_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<FixedOffset>,
    pub completed_at: Option<DateTime<FixedOffset>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    /// Retry attempts consumed after the first failure.
    pub retries: u32,
}

/// Per-execution record of one task run. Outlives its task: deleting the
/// task nulls `task_id` but keeps the row.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct TaskRunLog {
    pub id: Uuid,
    pub task_id: Option<Uuid>,
    pub started_at: DateTime<FixedOffset>,
    pub completed_at: Option<DateTime<FixedOffset>>,
    pub status: RunStatus,
    pub skip_reason: Option<String>,
    pub error_message: Option<String>,
    pub agent_results: Vec<AgentRunResult>,
}

impl TaskRunLog {
    /// A freshly started run.
    pub fn started(task_id: Uuid, started_at: DateTime<FixedOffset>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: Some(task_id),
            started_at,
            completed_at: None,
            status: RunStatus::Running,
            skip_reason: None,
            error_message: None,
            agent_results: Vec::new(),
        }
    }
}
