use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{TaskConfig, TaskFiring};

/// 调度器对外的控制面
///
/// 手动触发与定时触发走同一条执行路径，受同一条重叠规则约束；
/// 返回的 `TaskFiring` 是同步等到的终态记录（可能是
/// `SkippedOverlap`）。
#[async_trait]
pub trait JobControlService: Send + Sync {
    async fn trigger_by_id(&self, task_id: i64) -> Result<TaskFiring>;

    async fn trigger_by_name(&self, name: &str) -> Result<TaskFiring>;

    /// 启用/禁用已注册的任务
    async fn set_enabled(&self, task_id: i64, enabled: bool) -> Result<()>;

    /// 当前注册的任务清单
    async fn list_tasks(&self) -> Vec<TaskConfig>;
}
