use serde::{Deserialize, Serialize};

/// 批量API调用任务中的一行输入
///
/// 每一行独立处理：自身的重试是串行的，行与行之间互不影响。
/// 父级执行实例落库之前，每一行都必须到达终态（成功或失败），
/// 不允许静默丢行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRow {
    /// 行标识（取CSV首列，即案例编号）
    pub row_id: String,
    /// 来源文件名
    pub source_file: String,
    /// 行在文件中的序号，从0开始
    pub row_index: usize,
    /// 请求载荷
    pub payload: serde_json::Value,
    /// 原始响应体
    pub response: Option<String>,
    /// 从响应中解析出的结果
    pub parsed_result: Option<serde_json::Value>,
    pub status: BatchRowStatus,
    /// 已发起的调用次数
    pub attempts: u32,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchRowStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "retrying")]
    Retrying,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed")]
    Failed,
}

impl BatchRowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchRowStatus::Pending => "pending",
            BatchRowStatus::Retrying => "retrying",
            BatchRowStatus::Success => "success",
            BatchRowStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BatchRowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchRowStatus::Pending),
            "retrying" => Ok(BatchRowStatus::Retrying),
            "success" => Ok(BatchRowStatus::Success),
            "failed" => Ok(BatchRowStatus::Failed),
            _ => Err(format!("Invalid batch row status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for BatchRowStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for BatchRowStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for BatchRowStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl BatchRow {
    pub fn new(
        row_id: String,
        source_file: String,
        row_index: usize,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            row_id,
            source_file,
            row_index,
            payload,
            response: None,
            parsed_result: None,
            status: BatchRowStatus::Pending,
            attempts: 0,
            error_message: None,
        }
    }

    /// 行是否已到达终态
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BatchRowStatus::Success | BatchRowStatus::Failed)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.status, BatchRowStatus::Success)
    }

    pub fn mark_success(&mut self, response: String, parsed_result: Option<serde_json::Value>) {
        self.response = Some(response);
        self.parsed_result = parsed_result;
        self.status = BatchRowStatus::Success;
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = BatchRowStatus::Failed;
        self.error_message = Some(error.into());
    }
}
