use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use taskd_core::{
    BatchRow, BatchRowRepository, FiringRepository, ResultRecorder, TaskFiring,
};

/// 把执行结果写入数据库的记录器
///
/// 落库失败只记日志：执行结局在调用本记录器之前已经确定，
/// 持久化环节无权改写它。
pub struct DbResultRecorder {
    firings: Arc<dyn FiringRepository>,
    rows: Arc<dyn BatchRowRepository>,
}

impl DbResultRecorder {
    pub fn new(firings: Arc<dyn FiringRepository>, rows: Arc<dyn BatchRowRepository>) -> Self {
        Self { firings, rows }
    }
}

#[async_trait]
impl ResultRecorder for DbResultRecorder {
    async fn record_firing(&self, firing: &TaskFiring) {
        match self.firings.create(firing).await {
            Ok(()) => info!(
                "执行记录已落库: task={}, firing={}, outcome={}, 耗时{}ms",
                firing.task_name,
                firing.id,
                firing.outcome.as_str(),
                firing.execution_duration_ms()
            ),
            Err(e) => error!(
                "执行记录落库失败: task={}, firing={}: {}",
                firing.task_name, firing.id, e
            ),
        }
    }

    async fn record_rows(&self, firing: &TaskFiring, rows: &[BatchRow]) {
        match self.rows.create_many(firing.id, rows).await {
            Ok(()) => info!(
                "逐行结果已落库: firing={}, {} 行",
                firing.id,
                rows.len()
            ),
            Err(e) => error!("逐行结果落库失败: firing={}: {}", firing.id, e),
        }
    }
}
