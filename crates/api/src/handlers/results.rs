use axum::extract::{Path, State};

use taskd_core::BatchRow;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::routes::AppState;

/// 按行标识（案例编号）查询批量调用的历史结果
pub async fn get_row_results(
    State(state): State<AppState>,
    Path(row_id): Path<String>,
) -> ApiResult<ApiResponse<Vec<BatchRow>>> {
    let rows = state.row_repo.get_by_row_id(&row_id).await?;
    Ok(ApiResponse::success(rows))
}
