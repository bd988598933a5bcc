use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use taskd_core::{FiringRepository, Result, SchedulerError, TaskFiring};

pub struct SqliteFiringRepository {
    pool: SqlitePool,
}

impl SqliteFiringRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_firing(row: &sqlx::sqlite::SqliteRow) -> Result<TaskFiring> {
        let id: String = row.try_get("id")?;
        Ok(TaskFiring {
            id: Uuid::parse_str(&id)
                .map_err(|e| SchedulerError::Internal(format!("执行记录id无效: {e}")))?,
            task_id: row.try_get("task_id")?,
            task_name: row.try_get("task_name")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            outcome: row.try_get("outcome")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

#[async_trait]
impl FiringRepository for SqliteFiringRepository {
    async fn create(&self, firing: &TaskFiring) -> Result<()> {
        // INSERT OR IGNORE保证按id幂等：重复写入不产生第二条记录
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO task_firings
                (id, task_id, task_name, scheduled_at, started_at, completed_at, outcome, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(firing.id.to_string())
        .bind(firing.task_id)
        .bind(&firing.task_name)
        .bind(firing.scheduled_at)
        .bind(firing.started_at)
        .bind(firing.completed_at)
        .bind(firing.outcome)
        .bind(&firing.error_message)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            debug!("执行记录已存在，跳过: {}", firing.id);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<TaskFiring>> {
        let row = sqlx::query(
            "SELECT id, task_id, task_name, scheduled_at, started_at, completed_at,
                    outcome, error_message
             FROM task_firings WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.map(|row| Self::row_to_firing(&row)).transpose()
    }

    async fn get_recent_for_task(&self, task_id: i64, limit: i64) -> Result<Vec<TaskFiring>> {
        let rows = sqlx::query(
            "SELECT id, task_id, task_name, scheduled_at, started_at, completed_at,
                    outcome, error_message
             FROM task_firings WHERE task_id = $1
             ORDER BY scheduled_at DESC LIMIT $2",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_firing).collect()
    }
}
