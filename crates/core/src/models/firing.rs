use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::batch_row::BatchRow;
use super::task::TaskConfig;

/// 一次任务触发的执行记录
///
/// 任务到达调度时间（或被手动触发）即产生一次执行实例，记录从"到期"
/// 到"落库"的完整生命周期。同一任务在任意时刻最多只有一个在途实例，
/// 重叠的到期事件直接以 `SkippedOverlap` 终结，不执行任务体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFiring {
    pub id: Uuid,
    pub task_id: i64,
    pub task_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: FiringOutcome,
    pub error_message: Option<String>,
}

/// 执行实例的终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FiringOutcome {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "partial_success")]
    PartialSuccess,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "skipped_overlap")]
    SkippedOverlap,
}

impl FiringOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiringOutcome::Success => "success",
            FiringOutcome::PartialSuccess => "partial_success",
            FiringOutcome::Failed => "failed",
            FiringOutcome::SkippedOverlap => "skipped_overlap",
        }
    }
}

impl std::str::FromStr for FiringOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FiringOutcome::Success),
            "partial_success" => Ok(FiringOutcome::PartialSuccess),
            "failed" => Ok(FiringOutcome::Failed),
            "skipped_overlap" => Ok(FiringOutcome::SkippedOverlap),
            _ => Err(format!("Invalid firing outcome: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for FiringOutcome {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for FiringOutcome {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for FiringOutcome {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务体的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: OutcomeStatus,
    pub detail: Option<String>,
    /// 批量任务的逐行结果；其他任务类型为空
    pub rows: Vec<BatchRow>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutcomeStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "partial_success")]
    PartialSuccess,
    #[serde(rename = "failed")]
    Failed,
}

impl JobOutcome {
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            detail: None,
            rows: Vec::new(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            detail: Some(detail.into()),
            rows: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }
}

impl TaskFiring {
    /// 由执行结果构造终态记录
    pub fn from_outcome(
        task: &TaskConfig,
        scheduled_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        outcome: &JobOutcome,
    ) -> Self {
        let firing_outcome = match outcome.status {
            OutcomeStatus::Success => FiringOutcome::Success,
            OutcomeStatus::PartialSuccess => FiringOutcome::PartialSuccess,
            OutcomeStatus::Failed => FiringOutcome::Failed,
        };
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            task_name: task.name.clone(),
            scheduled_at,
            started_at,
            completed_at: Utc::now(),
            outcome: firing_outcome,
            error_message: outcome.detail.clone(),
        }
    }

    /// 重叠到期事件的记录：不执行任务体，立即终结
    pub fn skipped_overlap(task: &TaskConfig, scheduled_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            task_name: task.name.clone(),
            scheduled_at,
            started_at: now,
            completed_at: now,
            outcome: FiringOutcome::SkippedOverlap,
            error_message: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.outcome, FiringOutcome::Success)
    }

    pub fn execution_duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> TaskConfig {
        TaskConfig::new(
            "daily_report".to_string(),
            "0 2 * * *".to_string(),
            crate::models::JobKind::ReportGeneration,
            json!({}),
        )
    }

    #[test]
    fn test_from_outcome_maps_status() {
        let task = sample_task();
        let now = Utc::now();
        let firing = TaskFiring::from_outcome(&task, now, now, &JobOutcome::success());
        assert_eq!(firing.outcome, FiringOutcome::Success);
        assert!(firing.error_message.is_none());

        let firing = TaskFiring::from_outcome(&task, now, now, &JobOutcome::failed("boom"));
        assert_eq!(firing.outcome, FiringOutcome::Failed);
        assert_eq!(firing.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_skipped_overlap_is_terminal() {
        let task = sample_task();
        let firing = TaskFiring::skipped_overlap(&task, Utc::now());
        assert_eq!(firing.outcome, FiringOutcome::SkippedOverlap);
        assert!(firing.completed_at >= firing.started_at);
    }

    #[test]
    fn test_firing_outcome_roundtrip() {
        for outcome in [
            FiringOutcome::Success,
            FiringOutcome::PartialSuccess,
            FiringOutcome::Failed,
            FiringOutcome::SkippedOverlap,
        ] {
            let parsed: FiringOutcome = outcome.as_str().parse().unwrap();
            assert_eq!(parsed, outcome);
        }
    }
}
