use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info};

use taskd_api::{create_routes, AppState};
use taskd_core::{AppConfig, JobKind, TaskConfig, TaskRepository};
use taskd_dispatcher::JobScheduler;
use taskd_infrastructure::{
    connect_sqlite, run_migrations, DbResultRecorder, SqliteBatchRowRepository,
    SqliteFiringRepository, SqliteTaskRepository,
};
use taskd_worker::{JobRunner, UnlFetcher};

/// 应用实例：组装数据库、调度器与API服务
pub struct Application {
    config: AppConfig,
    scheduler: Arc<JobScheduler>,
    task_repo: Arc<SqliteTaskRepository>,
    firing_repo: Arc<SqliteFiringRepository>,
    row_repo: Arc<SqliteBatchRowRepository>,
    pool: sqlx::SqlitePool,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate().context("配置无效")?;

        let pool = connect_sqlite(&config.database.url, config.database.max_connections)
            .await
            .context("连接数据库失败")?;
        run_migrations(&pool).await.context("初始化表结构失败")?;

        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        seed_sample_task(&task_repo).await?;

        let firing_repo = Arc::new(SqliteFiringRepository::new(pool.clone()));
        let row_repo = Arc::new(SqliteBatchRowRepository::new(pool.clone()));

        let fetcher = Arc::new(UnlFetcher::new(config.fetch.clone()));
        let runner = Arc::new(JobRunner::new(
            config.batch.max_retries,
            config.batch.retry_backoff_ms,
            config.batch.request_timeout_seconds,
        ));
        let recorder = Arc::new(DbResultRecorder::new(
            firing_repo.clone(),
            row_repo.clone(),
        ));

        let scheduler = Arc::new(JobScheduler::new(
            fetcher,
            runner,
            recorder,
            &config.scheduler,
        ));

        // 禁用的任务也注册：协调循环跳过它们，但可以通过API重新启用
        let tasks = task_repo.get_all().await.context("加载任务定义失败")?;
        scheduler.register_all(tasks).await;

        Ok(Self {
            config,
            scheduler,
            task_repo,
            firing_repo,
            row_repo,
            pool,
        })
    }

    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        self.scheduler.start().await;

        if self.config.api.enabled {
            let state = AppState {
                control: self.scheduler.clone(),
                task_repo: self.task_repo.clone(),
                firing_repo: self.firing_repo.clone(),
                row_repo: self.row_repo.clone(),
            };
            let router = create_routes(state);

            let listener = tokio::net::TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("监听地址失败: {}", self.config.api.bind_address))?;
            info!("API服务监听于 {}", self.config.api.bind_address);

            let mut api_shutdown = shutdown_rx.clone();
            let serve_result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = api_shutdown.changed().await;
                })
                .await;
            if let Err(e) = serve_result {
                error!("API服务异常退出: {e}");
            }
        } else {
            info!("API服务已禁用");
            let _ = shutdown_rx.changed().await;
        }

        // 停止派发并等在途执行实例结束
        self.scheduler.stop().await;
        self.pool.close().await;
        Ok(())
    }
}

/// 首次启动时种入示例任务，便于验证调度链路
async fn seed_sample_task(task_repo: &SqliteTaskRepository) -> Result<()> {
    let existing = task_repo.get_all().await.context("查询任务定义失败")?;
    if !existing.is_empty() {
        return Ok(());
    }

    let sample = TaskConfig::new(
        "sample_task".to_string(),
        "*/30 * * * *".to_string(),
        JobKind::DataSync,
        json!({"source": "upstream", "target": "local"}),
    );
    let created = task_repo.create(&sample).await.context("创建示例任务失败")?;
    info!("任务表为空，已种入示例任务: {} (id={})", created.name, created.id);
    Ok(())
}
