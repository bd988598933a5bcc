use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("任务未找到: {name}")]
    TaskNotFoundByName { name: String },

    #[error("任务已被禁用: {name}")]
    TaskDisabled { name: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
