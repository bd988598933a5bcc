use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::info;

use taskd_core::{Result, SchedulerError, TaskConfig, TaskRepository};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<TaskConfig> {
        let parameters: String = row.try_get("parameters")?;
        Ok(TaskConfig {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            schedule: row.try_get("schedule")?,
            kind: row.try_get("kind")?,
            parameters: serde_json::from_str(&parameters)?,
            enabled: row.try_get("enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const TASK_COLUMNS: &str =
    "id, name, schedule, kind, parameters, enabled, created_at, updated_at";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &TaskConfig) -> Result<TaskConfig> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO task_configs (name, schedule, kind, parameters, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TASK_COLUMNS}
            "#,
        ))
        .bind(&task.name)
        .bind(&task.schedule)
        .bind(task.kind)
        .bind(task.parameters.to_string())
        .bind(task.enabled)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        let created = Self::row_to_task(&row)?;
        info!("任务定义已创建: {} (id={})", created.name, created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<TaskConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_configs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.map(|row| Self::row_to_task(&row)).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TaskConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_configs WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.map(|row| Self::row_to_task(&row)).transpose()
    }

    async fn get_all(&self) -> Result<Vec<TaskConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task_configs ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE task_configs SET enabled = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(enabled)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound { id });
        }
        Ok(())
    }
}
