use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use taskd_core::config::SchedulerConfig;
use taskd_core::{
    BatchRow, BatchRowRepository, FetchSpec, FiringOutcome, FiringRepository, JobControlService,
    JobKind, Result, TaskConfig, TaskRepository,
};
use taskd_dispatcher::JobScheduler;
use taskd_infrastructure::{
    connect_sqlite, run_migrations, DbResultRecorder, SqliteBatchRowRepository,
    SqliteFiringRepository, SqliteTaskRepository,
};
use taskd_worker::{BatchCall, CallResponse, JobRunner, UnlFetcher};

struct AlwaysOkCaller;

#[async_trait]
impl BatchCall for AlwaysOkCaller {
    async fn call(
        &self,
        _endpoint: &str,
        _api_key: Option<&str>,
        _row: &BatchRow,
    ) -> Result<CallResponse> {
        Ok(CallResponse {
            status: 200,
            body: r#"{"data": {"outputs": {"RES": "cleared"}}}"#.to_string(),
        })
    }
}

/// 手动触发走完整链路：预下载 → 任务体 → 执行记录与逐行结果落库
#[tokio::test]
async fn test_trigger_persists_firing_and_rows() {
    let pool = connect_sqlite("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let input_dir = tempfile::tempdir().unwrap();
    std::fs::write(input_dir.path().join("cases.csv"), "C001,high\nC002,low\n").unwrap();

    let task_repo = SqliteTaskRepository::new(pool.clone());
    let task = task_repo
        .create(&TaskConfig::new(
            "aml_batch".to_string(),
            "*/30 * * * *".to_string(),
            JobKind::BatchApiCall,
            json!({
                "api_endpoint": "http://api/workflow",
                "input_dir": input_dir.path(),
            }),
        ))
        .await
        .unwrap();

    let firing_repo = Arc::new(SqliteFiringRepository::new(pool.clone()));
    let row_repo = Arc::new(SqliteBatchRowRepository::new(pool));
    let recorder = Arc::new(DbResultRecorder::new(firing_repo.clone(), row_repo.clone()));

    let scheduler = JobScheduler::new(
        Arc::new(UnlFetcher::new(FetchSpec::default())),
        Arc::new(JobRunner::with_caller(Arc::new(AlwaysOkCaller), 0, 1)),
        recorder,
        &SchedulerConfig {
            poll_interval_seconds: 1,
            shutdown_timeout_seconds: 5,
        },
    );
    scheduler.register(task.clone()).await;

    let firing = scheduler.trigger_by_id(task.id).await.unwrap();
    assert_eq!(firing.outcome, FiringOutcome::Success);

    let stored = firing_repo.get_by_id(firing.id).await.unwrap().unwrap();
    assert_eq!(stored.task_name, "aml_batch");
    assert_eq!(stored.outcome, FiringOutcome::Success);

    let rows = row_repo.get_by_firing_id(firing.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.is_successful()));
    assert_eq!(rows[0].parsed_result, Some(json!("cleared")));

    let history = row_repo.get_by_row_id("C002").await.unwrap();
    assert_eq!(history.len(), 1);
}
