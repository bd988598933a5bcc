use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use taskd_core::{BatchRowRepository, FiringRepository, JobControlService, TaskRepository};

use crate::handlers::{
    health::health_check,
    results::get_row_results,
    tasks::{
        disable_task, enable_task, get_firing, get_task_history, list_tasks, trigger_task,
        trigger_task_by_name,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub control: Arc<dyn JobControlService>,
    pub task_repo: Arc<dyn TaskRepository>,
    pub firing_repo: Arc<dyn FiringRepository>,
    pub row_repo: Arc<dyn BatchRowRepository>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks/list", get(list_tasks))
        .route("/tasks/trigger/{id}", post(trigger_task))
        .route("/tasks/trigger_by_name/{name}", post(trigger_task_by_name))
        .route("/tasks/enable/{id}", post(enable_task))
        .route("/tasks/disable/{id}", post(disable_task))
        .route("/tasks/firings/{id}", get(get_firing))
        .route("/tasks/history/{task_id}", get(get_task_history))
        .route("/results/{row_id}", get(get_row_results))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
