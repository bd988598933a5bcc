use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use taskd_core::config::SchedulerConfig;
use taskd_core::{
    ArtifactFetcher, BatchRow, FetchOutcome, FiringOutcome, JobControlService, JobExecutor,
    JobOutcome, ResultRecorder, SchedulerError, TaskConfig, TaskFiring,
};
use taskd_dispatcher::JobScheduler;

/// 返回固定结果的预下载桩：可注入错误，验证错误不会阻塞任务体
struct StaticFetcher {
    errors: Vec<String>,
}

#[async_trait]
impl ArtifactFetcher for StaticFetcher {
    async fn fetch(&self) -> FetchOutcome {
        let mut outcome = FetchOutcome::not_attempted();
        outcome.errors = self.errors.clone();
        outcome
    }
}

/// 记录执行次数的执行器桩，可配置耗时和失败
struct CountingExecutor {
    delay_ms: u64,
    should_fail: bool,
    executed: AtomicUsize,
}

impl CountingExecutor {
    fn new(delay_ms: u64, should_fail: bool) -> Self {
        Self {
            delay_ms,
            should_fail,
            executed: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for CountingExecutor {
    async fn execute(&self, _task: &TaskConfig, _fetch: &FetchOutcome) -> taskd_core::Result<JobOutcome> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.executed.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            Err(SchedulerError::TaskExecution("模拟执行失败".to_string()))
        } else {
            Ok(JobOutcome::success())
        }
    }
}

/// 内存记录器桩
#[derive(Default)]
struct MemoryRecorder {
    firings: Mutex<Vec<TaskFiring>>,
}

impl MemoryRecorder {
    async fn firings(&self) -> Vec<TaskFiring> {
        self.firings.lock().await.clone()
    }
}

#[async_trait]
impl ResultRecorder for MemoryRecorder {
    async fn record_firing(&self, firing: &TaskFiring) {
        self.firings.lock().await.push(firing.clone());
    }

    async fn record_rows(&self, _firing: &TaskFiring, _rows: &[BatchRow]) {}
}

fn sample_task(id: i64, name: &str, schedule: &str) -> TaskConfig {
    let mut task = TaskConfig::new(
        name.to_string(),
        schedule.to_string(),
        taskd_core::JobKind::DataSync,
        json!({"source": "api_endpoint", "target": "database"}),
    );
    task.id = id;
    task
}

fn build_scheduler(
    executor: Arc<CountingExecutor>,
    recorder: Arc<MemoryRecorder>,
    fetch_errors: Vec<String>,
) -> JobScheduler {
    JobScheduler::new(
        Arc::new(StaticFetcher {
            errors: fetch_errors,
        }),
        executor,
        recorder,
        &SchedulerConfig {
            poll_interval_seconds: 1,
            shutdown_timeout_seconds: 5,
        },
    )
}

#[tokio::test]
async fn test_manual_trigger_returns_success_firing() {
    let executor = Arc::new(CountingExecutor::new(10, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(executor.clone(), recorder.clone(), Vec::new());
    scheduler.register(sample_task(1, "sync_job", "0 2 * * *")).await;

    let firing = scheduler.trigger_by_id(1).await.unwrap();
    assert_eq!(firing.outcome, FiringOutcome::Success);
    assert_eq!(executor.count(), 1);

    let recorded = recorder.firings().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].id, firing.id);
}

#[tokio::test]
async fn test_overlapping_firings_skip_without_executing() {
    let executor = Arc::new(CountingExecutor::new(300, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = Arc::new(build_scheduler(executor.clone(), recorder.clone(), Vec::new()));
    scheduler.register(sample_task(1, "slow_job", "0 2 * * *")).await;

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.trigger_by_id(1).await.unwrap() })
    };
    // 确保第一次触发已经占住在途标志
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = scheduler.trigger_by_id(1).await.unwrap();
    let first = first.await.unwrap();

    assert_eq!(second.outcome, FiringOutcome::SkippedOverlap);
    assert_eq!(first.outcome, FiringOutcome::Success);
    // 任务体只执行了一次
    assert_eq!(executor.count(), 1);
    // 两次触发都有记录
    assert_eq!(recorder.firings().await.len(), 2);
}

#[tokio::test]
async fn test_distinct_tasks_run_concurrently() {
    let executor = Arc::new(CountingExecutor::new(150, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = Arc::new(build_scheduler(executor.clone(), recorder.clone(), Vec::new()));
    scheduler.register(sample_task(1, "job_a", "0 2 * * *")).await;
    scheduler.register(sample_task(2, "job_b", "0 3 * * *")).await;

    let (a, b) = tokio::join!(
        {
            let s = scheduler.clone();
            async move { s.trigger_by_id(1).await.unwrap() }
        },
        {
            let s = scheduler.clone();
            async move { s.trigger_by_id(2).await.unwrap() }
        }
    );

    // 不同任务互不挤占，两个都成功执行
    assert_eq!(a.outcome, FiringOutcome::Success);
    assert_eq!(b.outcome, FiringOutcome::Success);
    assert_eq!(executor.count(), 2);
}

#[tokio::test]
async fn test_trigger_unknown_and_disabled_task() {
    let executor = Arc::new(CountingExecutor::new(0, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(executor.clone(), recorder.clone(), Vec::new());

    assert!(matches!(
        scheduler.trigger_by_id(42).await,
        Err(SchedulerError::TaskNotFound { id: 42 })
    ));
    assert!(matches!(
        scheduler.trigger_by_name("ghost").await,
        Err(SchedulerError::TaskNotFoundByName { .. })
    ));

    let mut task = sample_task(1, "paused_job", "0 2 * * *");
    task.enabled = false;
    scheduler.register(task).await;
    assert!(matches!(
        scheduler.trigger_by_id(1).await,
        Err(SchedulerError::TaskDisabled { .. })
    ));
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn test_set_enabled_toggles_triggerability() {
    let executor = Arc::new(CountingExecutor::new(0, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(executor.clone(), recorder.clone(), Vec::new());
    scheduler.register(sample_task(1, "toggled_job", "0 2 * * *")).await;

    scheduler.set_enabled(1, false).await.unwrap();
    assert!(matches!(
        scheduler.trigger_by_id(1).await,
        Err(SchedulerError::TaskDisabled { .. })
    ));
    assert_eq!(executor.count(), 0);

    scheduler.set_enabled(1, true).await.unwrap();
    let firing = scheduler.trigger_by_id(1).await.unwrap();
    assert_eq!(firing.outcome, FiringOutcome::Success);

    assert!(matches!(
        scheduler.set_enabled(42, false).await,
        Err(SchedulerError::TaskNotFound { id: 42 })
    ));
}

#[tokio::test]
async fn test_executor_error_recorded_and_isolated() {
    let executor = Arc::new(CountingExecutor::new(0, true));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(executor.clone(), recorder.clone(), Vec::new());
    scheduler.register(sample_task(1, "flaky_job", "0 2 * * *")).await;

    let firing = scheduler.trigger_by_id(1).await.unwrap();
    assert_eq!(firing.outcome, FiringOutcome::Failed);
    assert!(firing.error_message.as_deref().unwrap().contains("模拟执行失败"));

    // 单次失败不影响后续触发，在途标志已释放
    let firing = scheduler.trigger_by_id(1).await.unwrap();
    assert_eq!(firing.outcome, FiringOutcome::Failed);
    assert_eq!(recorder.firings().await.len(), 2);
}

#[tokio::test]
async fn test_fetch_errors_never_block_job_body() {
    let executor = Arc::new(CountingExecutor::new(0, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(
        executor.clone(),
        recorder.clone(),
        vec!["下载请求失败，状态码: 500".to_string()],
    );
    scheduler.register(sample_task(1, "sync_job", "0 2 * * *")).await;

    let firing = scheduler.trigger_by_id(1).await.unwrap();
    // 预下载失败是建议性失败，任务体照常执行且成功
    assert_eq!(firing.outcome, FiringOutcome::Success);
    assert_eq!(executor.count(), 1);
}

#[tokio::test]
async fn test_scheduled_firing_and_stop_drains() {
    let executor = Arc::new(CountingExecutor::new(10, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(executor.clone(), recorder.clone(), Vec::new());
    // 每秒触发一次
    scheduler.register(sample_task(1, "tick_job", "* * * * * *")).await;

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await;

    let fired = recorder.firings().await.len();
    assert!(fired >= 1, "调度循环应至少触发一次，实际 {fired}");

    // 停止后不再产生新触发
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(recorder.firings().await.len(), fired);
}

#[tokio::test]
async fn test_stop_waits_for_inflight_firing() {
    let executor = Arc::new(CountingExecutor::new(500, false));
    let recorder = Arc::new(MemoryRecorder::default());
    let scheduler = build_scheduler(executor.clone(), recorder.clone(), Vec::new());
    scheduler.register(sample_task(1, "slow_tick_job", "* * * * * *")).await;

    scheduler.start().await;
    // 等到一次触发进入任务体内部再停止
    tokio::time::sleep(Duration::from_millis(1300)).await;
    scheduler.stop().await;

    // stop() 返回时在途触发已经跑完并落到终态记录
    let recorded = recorder.firings().await;
    assert!(!recorded.is_empty(), "停止前应已有在途触发");
    for firing in &recorded {
        assert_eq!(firing.outcome, FiringOutcome::Success);
        assert!(firing.completed_at >= firing.started_at);
    }
    assert_eq!(recorded.len(), executor.count());
}
