use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One AI trading agent: an LLM configuration bound to a simulated cash
/// account. Created once, mutated only through explicit updates, and soft
/// deleted via [`AgentStatus::Deleted`] - never removed from storage.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub initial_cash: Decimal,
    /// Selects the LLM endpoint row; `None` means the agent cannot run.
    pub provider_id: Option<String>,
    pub model_name: String,
    pub template_id: Option<Uuid>,
    pub schedule_type: ScheduleType,
    pub status: AgentStatus,
    pub created_at: DateTime<FixedOffset>,
}

impl Agent {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
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
pub enum AgentStatus {
    #[display("active")]
    Active,
    #[display("paused")]
    Paused,
    #[display("deleted")]
    Deleted,
}

/// Decision cadence configured per agent.
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
pub enum ScheduleType {
    #[serde(rename = "daily")]
    #[display("daily")]
    Daily,
    #[serde(rename = "hourly")]
    #[display("hourly")]
    Hourly,
    #[serde(rename = "every_30_min")]
    #[display("every_30_min")]
    Every30Min,
    #[serde(rename = "every_15_min")]
    #[display("every_15_min")]
    Every15Min,
    #[serde(rename = "manual")]
    #[display("manual")]
    Manual,
}

impl ScheduleType {
    /// Equivalent 5-field cron expression, `None` for manual-only agents.
    ///
    /// Daily agents fire shortly after the morning open.
    pub fn cron_expression(&self) -> Option<&'static str> {
        match self {
            Self::Daily => Some("35 9 * * *"),
            Self::Hourly => Some("0 * * * *"),
            Self::Every30Min => Some("*/30 * * * *"),
            Self::Every15Min => Some("*/15 * * * *"),
            Self::Manual => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_type_serde() {
        assert_eq!(
            serde_json::to_string(&ScheduleType::Every30Min).unwrap(),
            "\"every_30_min\""
        );
        assert_eq!(
            serde_json::from_str::<ScheduleType>("\"manual\"").unwrap(),
            ScheduleType::Manual
        );
    }

    #[test]
    fn test_manual_agents_have_no_cron() {
        assert_eq!(ScheduleType::Manual.cron_expression(), None);
        assert!(ScheduleType::Daily.cron_expression().is_some());
    }
}
