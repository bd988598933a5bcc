use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use taskd_core::{
    BatchRow, FetchOutcome, JobExecutor, JobKind, JobOutcome, OutcomeStatus, Result,
    SchedulerError, TaskConfig,
};

use crate::batch::{BatchCall, BatchInvoker, HttpBatchCaller};

/// 批量API调用任务的参数，来自任务配置的 `parameters` 字段
#[derive(Debug, Deserialize)]
struct BatchCallParams {
    api_endpoint: String,
    /// 输入目录；缺省时使用预下载产物目录
    input_dir: Option<PathBuf>,
    api_key: Option<String>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

/// 任务体执行器
///
/// 按任务类型分派：数据同步和报表生成记录参数后直接成功（任务体
/// 对调度核心不透明），批量API调用任务加载输入文件并逐行调用远端
/// 接口。未知类型在类型系统层面不存在。
pub struct JobRunner {
    invoker: BatchInvoker,
    default_max_retries: u32,
    default_backoff: Duration,
}

impl JobRunner {
    pub fn new(
        default_max_retries: u32,
        default_backoff_ms: u64,
        request_timeout_seconds: u64,
    ) -> Self {
        Self::with_caller(
            Arc::new(HttpBatchCaller::new(request_timeout_seconds)),
            default_max_retries,
            default_backoff_ms,
        )
    }

    pub fn with_caller(
        caller: Arc<dyn BatchCall>,
        default_max_retries: u32,
        default_backoff_ms: u64,
    ) -> Self {
        Self {
            invoker: BatchInvoker::new(caller),
            default_max_retries,
            default_backoff: Duration::from_millis(default_backoff_ms),
        }
    }

    async fn run_batch_api_call(
        &self,
        task: &TaskConfig,
        fetch: &FetchOutcome,
    ) -> Result<JobOutcome> {
        let params: BatchCallParams = serde_json::from_value(task.parameters.clone())
            .map_err(|e| SchedulerError::InvalidTaskParams(format!("批量任务参数无效: {e}")))?;

        let input_dir = match params.input_dir.as_deref().or_else(|| fetch.artifact_dir()) {
            Some(dir) => dir.to_path_buf(),
            None => {
                return Ok(JobOutcome::failed(
                    "未配置输入目录且预下载未产生可用目录",
                ));
            }
        };

        // 预下载产物是 .unl.gz，先转换为CSV再加载；转换失败是建议性失败
        for error in crate::convert::convert_unl_artifacts(&input_dir) {
            warn!("UNL产物转换失败: {error}");
        }

        let rows = match load_rows(&input_dir) {
            Ok(rows) => rows,
            Err(e) => return Ok(JobOutcome::failed(format!("加载输入文件失败: {e}"))),
        };
        if rows.is_empty() {
            // 零行输入算失败：没有可处理的数据不是一次成功的批次
            return Ok(JobOutcome::failed(format!(
                "输入目录 {} 中没有可处理的行",
                input_dir.display()
            )));
        }

        let max_retries = params.max_retries.unwrap_or(self.default_max_retries);
        let backoff = params
            .retry_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_backoff);

        info!(
            "开始批量API调用: task={}, endpoint={}, {} 行, max_retries={}",
            task.name,
            params.api_endpoint,
            rows.len(),
            max_retries
        );

        let rows = self
            .invoker
            .invoke_batch(
                &params.api_endpoint,
                params.api_key.as_deref(),
                rows,
                max_retries,
                backoff,
            )
            .await;

        Ok(aggregate(rows))
    }
}

#[async_trait]
impl JobExecutor for JobRunner {
    async fn execute(&self, task: &TaskConfig, fetch: &FetchOutcome) -> Result<JobOutcome> {
        match task.kind {
            JobKind::DataSync => {
                info!(
                    "执行数据同步任务: {}, 参数: {}",
                    task.name, task.parameters
                );
                Ok(JobOutcome::success())
            }
            JobKind::ReportGeneration => {
                info!(
                    "执行报表生成任务: {}, 参数: {}",
                    task.name, task.parameters
                );
                Ok(JobOutcome::success())
            }
            JobKind::BatchApiCall => self.run_batch_api_call(task, fetch).await,
        }
    }
}

/// 聚合逐行结果为批次结局
///
/// 全部成功为成功，全部失败为失败，混合为部分成功。调用前已保证
/// 每一行处于终态。
fn aggregate(rows: Vec<BatchRow>) -> JobOutcome {
    let total = rows.len();
    let succeeded = rows.iter().filter(|r| r.is_successful()).count();
    let status = if succeeded == total {
        OutcomeStatus::Success
    } else if succeeded == 0 {
        OutcomeStatus::Failed
    } else {
        OutcomeStatus::PartialSuccess
    };
    JobOutcome {
        status,
        detail: Some(format!("{succeeded}/{total} 行成功")),
        rows,
    }
}

/// 从输入目录加载所有CSV文件的行
///
/// 首列作为行标识（案例编号），整行各列以 `column_{i}` 为键装入
/// 请求载荷。空行跳过。
fn load_rows(dir: &Path) -> std::io::Result<Vec<BatchRow>> {
    let mut rows = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    entries.sort();

    for path in entries {
        let source_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let content = std::fs::read_to_string(&path)?;
        let mut file_rows = 0usize;
        for (row_index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let row_id = fields[0].to_string();
            let mut payload = serde_json::Map::new();
            for (i, field) in fields.iter().enumerate() {
                payload.insert(format!("column_{i}"), serde_json::Value::from(*field));
            }
            rows.push(BatchRow::new(
                row_id,
                source_file.clone(),
                row_index,
                serde_json::Value::Object(payload),
            ));
            file_rows += 1;
        }
        info!("已加载输入文件 {}: {} 行", source_file, file_rows);
        if file_rows == 0 {
            warn!("输入文件 {} 没有有效行", source_file);
        }
    }
    Ok(rows)
}
