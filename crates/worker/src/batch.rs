use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use taskd_core::{BatchRow, BatchRowStatus, Result, SchedulerError};

/// 单行远程调用的响应
#[derive(Debug, Clone)]
pub struct CallResponse {
    pub status: u16,
    pub body: String,
}

/// 批量任务的单行远程调用
///
/// 传输层错误以 `Err` 返回（可重试）；收到响应即为 `Ok`，
/// 状态码留给调用方分类。
#[async_trait]
pub trait BatchCall: Send + Sync {
    async fn call(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        row: &BatchRow,
    ) -> Result<CallResponse>;
}

/// 生产实现：每行一次POST，bearer鉴权，阻塞式工作流调用
pub struct HttpBatchCaller {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpBatchCaller {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl BatchCall for HttpBatchCaller {
    async fn call(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        row: &BatchRow,
    ) -> Result<CallResponse> {
        let payload = serde_json::json!({
            "inputs": row.payload,
            "response_mode": "blocking",
            "user": "taskd",
        });
        let mut request = self.client.post(endpoint).timeout(self.timeout).json(&payload);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SchedulerError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SchedulerError::Network(e.to_string()))?;
        Ok(CallResponse { status, body })
    }
}

/// 批量调用器
///
/// 逐行处理输入：行与行之间相互独立（没有顺序承诺），单行自身的
/// 重试是串行的。一行耗尽重试只会让这一行失败，绝不会中断其余行
/// 的处理——这是部分失败策略：坏行降级批次结局，不拖垮整次触发。
/// 调用结束时每一行都保证处于终态。
pub struct BatchInvoker {
    caller: Arc<dyn BatchCall>,
}

impl BatchInvoker {
    pub fn new(caller: Arc<dyn BatchCall>) -> Self {
        Self { caller }
    }

    pub async fn invoke_batch(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        mut rows: Vec<BatchRow>,
        max_retries: u32,
        backoff: Duration,
    ) -> Vec<BatchRow> {
        for row in rows.iter_mut() {
            self.invoke_row(endpoint, api_key, row, max_retries, backoff)
                .await;
        }
        rows
    }

    /// 处理一行直到终态。传输错误和5xx重试，最多调用
    /// `max_retries + 1` 次；其他非2xx状态码不重试直接失败。
    async fn invoke_row(
        &self,
        endpoint: &str,
        api_key: Option<&str>,
        row: &mut BatchRow,
        max_retries: u32,
        backoff: Duration,
    ) {
        loop {
            row.attempts += 1;
            let retryable_error = match self.caller.call(endpoint, api_key, row).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    let parsed = Self::parse_result(&response.body);
                    info!(
                        "批量调用成功: row_id={}, 第{}次尝试, 状态码={}",
                        row.row_id, row.attempts, response.status
                    );
                    row.mark_success(response.body, parsed);
                    return;
                }
                Ok(response) if response.status >= 500 => {
                    format!("服务端错误，状态码: {}", response.status)
                }
                Ok(response) => {
                    warn!(
                        "批量调用失败且不可重试: row_id={}, 状态码={}",
                        row.row_id, response.status
                    );
                    row.mark_failed(format!("调用失败，状态码: {}", response.status));
                    return;
                }
                Err(e) => format!("传输错误: {e}"),
            };

            if row.attempts > max_retries {
                warn!(
                    "批量调用重试耗尽: row_id={}, 共尝试{}次: {}",
                    row.row_id, row.attempts, retryable_error
                );
                row.mark_failed(retryable_error);
                return;
            }

            warn!(
                "批量调用第{}次尝试失败，退避后重试: row_id={}, {}",
                row.attempts, row.row_id, retryable_error
            );
            row.status = BatchRowStatus::Retrying;
            tokio::time::sleep(backoff).await;
        }
    }

    /// 从响应体中提取 data.outputs.RES 作为解析结果
    fn parse_result(body: &str) -> Option<serde_json::Value> {
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        json.get("data")?.get("outputs")?.get("RES").cloned()
    }
}
