pub mod sqlite;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use taskd_core::{Result, SchedulerError};

/// 建立SQLite连接池。文件不存在时自动创建，启用WAL以允许
/// 调度循环与API并发读写
pub async fn connect_sqlite(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(SchedulerError::Database)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(SchedulerError::Database)?;

    info!("SQLite连接池已建立: {url}");
    Ok(pool)
}

/// 初始化表结构，可重复执行
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            schedule TEXT NOT NULL,
            kind TEXT NOT NULL,
            parameters TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::Database)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_firings (
            id TEXT PRIMARY KEY,
            task_id INTEGER NOT NULL,
            task_name TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            outcome TEXT NOT NULL,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::Database)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_task_firings_task_id
         ON task_firings (task_id, scheduled_at)",
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::Database)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_row_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            firing_id TEXT NOT NULL,
            row_id TEXT NOT NULL,
            source_file TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            payload TEXT NOT NULL,
            response TEXT,
            parsed_result TEXT,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::Database)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_batch_row_results_firing
         ON batch_row_results (firing_id)",
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::Database)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_batch_row_results_row_id
         ON batch_row_results (row_id)",
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::Database)?;

    info!("数据库表结构初始化完成");
    Ok(())
}
