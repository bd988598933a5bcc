use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use taskd_core::{BatchRow, BatchRowRepository, Result, SchedulerError};

pub struct SqliteBatchRowRepository {
    pool: SqlitePool,
}

impl SqliteBatchRowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_batch_row(row: &sqlx::sqlite::SqliteRow) -> Result<BatchRow> {
        let payload: String = row.try_get("payload")?;
        let parsed_result: Option<String> = row.try_get("parsed_result")?;
        let row_index: i64 = row.try_get("row_index")?;
        let attempts: i64 = row.try_get("attempts")?;
        Ok(BatchRow {
            row_id: row.try_get("row_id")?,
            source_file: row.try_get("source_file")?,
            row_index: row_index as usize,
            payload: serde_json::from_str(&payload)?,
            response: row.try_get("response")?,
            parsed_result: parsed_result
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            status: row.try_get("status")?,
            attempts: attempts as u32,
            error_message: row.try_get("error_message")?,
        })
    }
}

const ROW_COLUMNS: &str = "row_id, source_file, row_index, payload, response, \
                           parsed_result, status, attempts, error_message";

#[async_trait]
impl BatchRowRepository for SqliteBatchRowRepository {
    async fn create_many(&self, firing_id: Uuid, rows: &[BatchRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(SchedulerError::Database)?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO batch_row_results
                    (firing_id, row_id, source_file, row_index, payload, response,
                     parsed_result, status, attempts, error_message)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(firing_id.to_string())
            .bind(&row.row_id)
            .bind(&row.source_file)
            .bind(row.row_index as i64)
            .bind(row.payload.to_string())
            .bind(&row.response)
            .bind(row.parsed_result.as_ref().map(|v| v.to_string()))
            .bind(row.status)
            .bind(row.attempts as i64)
            .bind(&row.error_message)
            .execute(&mut *tx)
            .await
            .map_err(SchedulerError::Database)?;
        }
        tx.commit().await.map_err(SchedulerError::Database)?;
        Ok(())
    }

    async fn get_by_firing_id(&self, firing_id: Uuid) -> Result<Vec<BatchRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM batch_row_results
             WHERE firing_id = $1 ORDER BY source_file, row_index"
        ))
        .bind(firing_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_batch_row).collect()
    }

    async fn get_by_row_id(&self, row_id: &str) -> Result<Vec<BatchRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM batch_row_results
             WHERE row_id = $1 ORDER BY id DESC"
        ))
        .bind(row_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_batch_row).collect()
    }
}
