use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use taskd_core::SchedulerError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type) = match &self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 ID {id} 不存在"),
                "TASK_NOT_FOUND",
            ),
            ApiError::Scheduler(SchedulerError::TaskNotFoundByName { name }) => (
                StatusCode::NOT_FOUND,
                format!("任务 '{name}' 不存在"),
                "TASK_NOT_FOUND",
            ),
            ApiError::Scheduler(SchedulerError::TaskDisabled { name }) => (
                StatusCode::BAD_REQUEST,
                format!("任务 '{name}' 已禁用，无法触发"),
                "TASK_DISABLED",
            ),
            ApiError::Scheduler(SchedulerError::InvalidTaskParams(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("任务参数无效: {msg}"),
                "INVALID_TASK_PARAMS",
            ),
            ApiError::Scheduler(SchedulerError::InvalidCron { expr, message }) => (
                StatusCode::BAD_REQUEST,
                format!("Cron表达式 '{expr}' 无效: {message}"),
                "INVALID_CRON_EXPRESSION",
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
            ),
            ApiError::Scheduler(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
