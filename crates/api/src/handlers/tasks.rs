use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use taskd_core::{TaskConfig, TaskFiring};

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

/// 任务清单
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<ApiResponse<Vec<TaskConfig>>> {
    let tasks = state.control.list_tasks().await;
    Ok(ApiResponse::success(tasks))
}

/// 手动触发任务。同步等待执行结束，返回终态记录；
/// 与定时触发受同一条重叠规则约束
pub async fn trigger_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<TaskFiring>> {
    info!("收到手动触发请求: task_id={id}");
    let firing = state.control.trigger_by_id(id).await?;
    Ok(ApiResponse::success_with_message(
        firing,
        "任务已执行".to_string(),
    ))
}

pub async fn trigger_task_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ApiResponse<TaskFiring>> {
    info!("收到手动触发请求: task={name}");
    let firing = state.control.trigger_by_name(&name).await?;
    Ok(ApiResponse::success_with_message(
        firing,
        "任务已执行".to_string(),
    ))
}

/// 启用任务：先落库，再更新调度器里的注册表
pub async fn enable_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    set_task_enabled(&state, id, true).await?;
    Ok(ApiResponse::success_with_message((), "任务已启用".to_string()))
}

/// 禁用任务。禁用只抑制后续到期事件，在途执行实例照常跑完
pub async fn disable_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<()>> {
    set_task_enabled(&state, id, false).await?;
    Ok(ApiResponse::success_with_message((), "任务已禁用".to_string()))
}

async fn set_task_enabled(state: &AppState, id: i64, enabled: bool) -> ApiResult<()> {
    info!("收到任务{}请求: task_id={id}", if enabled { "启用" } else { "禁用" });
    state.task_repo.set_enabled(id, enabled).await?;
    state.control.set_enabled(id, enabled).await?;
    Ok(())
}

/// 按执行实例uuid查询一条执行记录
pub async fn get_firing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<TaskFiring>> {
    let firing = state
        .firing_repo
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(ApiResponse::success(firing))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// 某任务最近的执行记录，按调度时间倒序
pub async fn get_task_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<ApiResponse<Vec<TaskFiring>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let firings = state.firing_repo.get_recent_for_task(id, limit).await?;
    Ok(ApiResponse::success(firings))
}
