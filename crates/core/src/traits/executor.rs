use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{BatchRow, FetchOutcome, JobOutcome, TaskConfig, TaskFiring};

/// 任务体执行器
///
/// 按任务类型分发执行。执行器内部的错误应尽量收敛为
/// `JobOutcome::failed`；返回 `Err` 同样会被调度器捕获并记录为
/// 失败的执行实例，绝不会中断其他任务的调度。
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, task: &TaskConfig, fetch: &FetchOutcome) -> Result<JobOutcome>;
}

/// 预下载步骤
///
/// 在每次任务触发前执行一次（含手动触发）。契约：永不失败——
/// 所有错误收敛进 `FetchOutcome.errors`，任务体照常执行。
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self) -> FetchOutcome;
}

/// 结果记录器
///
/// 只追加。落库失败只记日志，不会回头改变调用方已观察到的执行
/// 结局——持久化失败是上报失败，不是任务失败。
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record_firing(&self, firing: &TaskFiring);

    async fn record_rows(&self, firing: &TaskFiring, rows: &[BatchRow]);
}
