use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{BatchRow, TaskConfig, TaskFiring};

/// 任务定义仓库
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 新建任务定义，返回带数据库生成id的记录
    async fn create(&self, task: &TaskConfig) -> Result<TaskConfig>;

    async fn get_by_id(&self, id: i64) -> Result<Option<TaskConfig>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<TaskConfig>>;

    /// 全部任务（含禁用）
    async fn get_all(&self) -> Result<Vec<TaskConfig>>;

    /// 启用/禁用任务。任务不会被删除，只会被禁用
    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()>;
}

/// 执行实例仓库，只追加
#[async_trait]
pub trait FiringRepository: Send + Sync {
    /// 持久化一条执行记录。按id幂等：同一id的第二次写入是无操作，
    /// 不会产生结局冲突的重复记录
    async fn create(&self, firing: &TaskFiring) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<TaskFiring>>;

    /// 某任务最近的若干条执行记录，按调度时间倒序
    async fn get_recent_for_task(&self, task_id: i64, limit: i64) -> Result<Vec<TaskFiring>>;
}

/// 批量调用逐行结果仓库，只追加
#[async_trait]
pub trait BatchRowRepository: Send + Sync {
    async fn create_many(&self, firing_id: Uuid, rows: &[BatchRow]) -> Result<()>;

    async fn get_by_firing_id(&self, firing_id: Uuid) -> Result<Vec<BatchRow>>;

    /// 按行标识（案例编号）查询历史结果
    async fn get_by_row_id(&self, row_id: &str) -> Result<Vec<BatchRow>>;
}
