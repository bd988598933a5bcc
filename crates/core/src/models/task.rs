use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务定义
///
/// 表示一个可按cron表达式调度执行的任务，包含任务的完整配置信息。
///
/// # 字段说明
///
/// - `id`: 任务的唯一标识符
/// - `name`: 任务的人类可读名称
/// - `schedule`: cron 表达式，定义任务的执行时间
/// - `kind`: 任务类型（数据同步/报表生成/批量API调用）
/// - `parameters`: 任务执行所需的参数，JSON 格式，语义由执行器解释
/// - `enabled`: 是否参与调度；禁用只抑制后续触发，不删除任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: i64,
    pub name: String,
    pub schedule: String, // cron 表达式
    pub kind: JobKind,
    pub parameters: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 任务类型
///
/// 封闭的类型枚举：每个变体在执行器中有且仅有一个处理分支，
/// 由编译器保证穷尽，而不是运行时的名字查找。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobKind {
    #[serde(rename = "data_sync")]
    DataSync,
    #[serde(rename = "report_generation")]
    ReportGeneration,
    #[serde(rename = "batch_api_call")]
    BatchApiCall,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::DataSync => "data_sync",
            JobKind::ReportGeneration => "report_generation",
            JobKind::BatchApiCall => "batch_api_call",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data_sync" => Ok(JobKind::DataSync),
            "report_generation" => Ok(JobKind::ReportGeneration),
            "batch_api_call" => Ok(JobKind::BatchApiCall),
            _ => Err(format!("Invalid job kind: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl TaskConfig {
    /// 创建新任务
    pub fn new(name: String, schedule: String, kind: JobKind, parameters: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            name,
            schedule,
            kind,
            parameters,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// 检查任务是否参与调度
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
