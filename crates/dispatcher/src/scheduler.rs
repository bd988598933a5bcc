use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use taskd_core::config::SchedulerConfig;
use taskd_core::{
    ArtifactFetcher, JobControlService, JobExecutor, JobOutcome, Result, ResultRecorder,
    SchedulerError, TaskConfig, TaskFiring,
};

use crate::cron_utils::CronScheduler;

/// 任务调度器
///
/// 持有注册的任务集合，按各自的cron节奏独立触发。协调循环只做到期
/// 评估，从不在I/O上阻塞；每次触发的执行体（预下载→任务体→落库）
/// 派发到独立的tokio任务上，慢任务不会拖住其他任务的到期评估。
///
/// 重叠策略：同一任务在任意时刻最多一个在途执行实例。任务体（尤其
/// 是批量调用）可能比自身周期还长，重复的并发执行绝不允许发生——
/// 在途期间的到期事件记录为 `SkippedOverlap` 后丢弃。手动触发受
/// 同一条规则约束。
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

struct SchedulerInner {
    tasks: RwLock<HashMap<i64, TaskConfig>>,
    /// 每任务的"在途"标志：协调循环与执行体之间唯一的共享可变状态
    running: Arc<StdMutex<HashSet<i64>>>,
    fetcher: Arc<dyn ArtifactFetcher>,
    executor: Arc<dyn JobExecutor>,
    recorder: Arc<dyn ResultRecorder>,
    poll_interval: Duration,
}

/// 在途标志的RAII守卫：无论执行体如何退出（包括panic展开），
/// Drop都会释放标志
struct RunningGuard {
    running: Arc<StdMutex<HashSet<i64>>>,
    task_id: i64,
}

impl RunningGuard {
    /// 尝试置位；已在途则返回None
    fn try_acquire(running: Arc<StdMutex<HashSet<i64>>>, task_id: i64) -> Option<Self> {
        let acquired = running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id);
        acquired.then_some(Self { running, task_id })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

impl JobScheduler {
    pub fn new(
        fetcher: Arc<dyn ArtifactFetcher>,
        executor: Arc<dyn JobExecutor>,
        recorder: Arc<dyn ResultRecorder>,
        config: &SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                tasks: RwLock::new(HashMap::new()),
                running: Arc::new(StdMutex::new(HashSet::new())),
                fetcher,
                executor,
                recorder,
                poll_interval: Duration::from_secs(config.poll_interval_seconds),
            }),
            coordinator: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// 注册任务，按id新增或替换
    pub async fn register(&self, task: TaskConfig) {
        if let Err(e) = CronScheduler::validate_cron_expression(&task.schedule) {
            warn!("任务 {} 的CRON表达式无效，仍注册但不会被调度: {}", task.name, e);
        }
        let mut tasks = self.inner.tasks.write().await;
        tasks.insert(task.id, task);
    }

    /// 批量注册（启动时从数据库加载）
    pub async fn register_all(&self, tasks: Vec<TaskConfig>) {
        let count = tasks.len();
        for task in tasks {
            self.register(task).await;
        }
        info!("已注册 {} 个任务", count);
    }

    /// 启动协调循环
    pub async fn start(&self) {
        let mut coordinator = self.coordinator.lock().await;
        if coordinator.is_some() {
            warn!("任务调度器已在运行");
            return;
        }
        let _ = self.shutdown_tx.send(false);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let inner = Arc::clone(&self.inner);
        *coordinator = Some(tokio::spawn(inner.run_loop(shutdown_rx)));
        info!("任务调度器已启动");
    }

    /// 停止调度：不再派发新触发，等在途执行实例全部到达终态后返回
    pub async fn stop(&self) {
        let handle = self.coordinator.lock().await.take();
        match handle {
            Some(handle) => {
                let _ = self.shutdown_tx.send(true);
                if let Err(e) = handle.await {
                    error!("调度器协调任务异常退出: {e}");
                }
                info!("任务调度器已停止");
            }
            None => warn!("任务调度器未在运行"),
        }
    }
}

impl SchedulerInner {
    async fn run_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // 每任务的下次到期时间，随schedule变更失效重算
        let mut next_due: HashMap<i64, (String, DateTime<Utc>)> = HashMap::new();
        let mut firings = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.evaluate_due_tasks(&mut next_due, &mut firings).await;
                    // 回收已结束的执行体
                    while firings.try_join_next().is_some() {}
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        if !firings.is_empty() {
            info!("调度器停止派发，等待 {} 个在途执行实例结束", firings.len());
        }
        while firings.join_next().await.is_some() {}
    }

    /// 一轮到期评估：纯内存计算，不触碰I/O
    async fn evaluate_due_tasks(
        self: &Arc<Self>,
        next_due: &mut HashMap<i64, (String, DateTime<Utc>)>,
        firings: &mut JoinSet<()>,
    ) {
        let now = Utc::now();
        let snapshot: Vec<TaskConfig> = {
            let tasks = self.tasks.read().await;
            tasks.values().filter(|t| t.is_enabled()).cloned().collect()
        };
        // 被删除或禁用的任务不保留到期时间，重新启用后从下一个周期开始
        next_due.retain(|id, _| snapshot.iter().any(|t| t.id == *id));

        for task in snapshot {
            let due = match next_due.get(&task.id) {
                Some((schedule, due)) if *schedule == task.schedule => *due,
                _ => {
                    // 首次见到该任务或schedule已变更：只登记下次到期时间
                    match CronScheduler::new(&task.schedule) {
                        Ok(cron) => match cron.next_execution_time(now) {
                            Some(next) => {
                                debug!("任务 {} 下次到期: {}", task.name, next);
                                next_due.insert(task.id, (task.schedule.clone(), next));
                            }
                            None => warn!("任务 {} 不会再有到期时间", task.name),
                        },
                        Err(e) => warn!("任务 {} 的CRON表达式无效: {}", task.name, e),
                    }
                    continue;
                }
            };

            if due <= now {
                // 先推进到期时间，再派发本次触发
                if let Ok(cron) = CronScheduler::new(&task.schedule) {
                    match cron.next_execution_time(now) {
                        Some(next) => {
                            next_due.insert(task.id, (task.schedule.clone(), next));
                        }
                        None => {
                            next_due.remove(&task.id);
                        }
                    }
                }
                let inner = Arc::clone(self);
                firings.spawn(async move {
                    inner.execute_firing(task, due).await;
                });
            }
        }
    }

    /// 执行一次触发：预下载 → 任务体 → 落库
    ///
    /// 任务体的任何错误都收敛为失败的执行记录，不会向上传播；
    /// 预下载按其自身契约永不失败。
    async fn execute_firing(
        self: &Arc<Self>,
        task: TaskConfig,
        scheduled_at: DateTime<Utc>,
    ) -> TaskFiring {
        let Some(_guard) = RunningGuard::try_acquire(Arc::clone(&self.running), task.id) else {
            warn!(
                "任务 {} 仍在执行中，本次到期事件按重叠跳过 (scheduled_at={})",
                task.name, scheduled_at
            );
            let firing = TaskFiring::skipped_overlap(&task, scheduled_at);
            self.recorder.record_firing(&firing).await;
            return firing;
        };

        let started_at = Utc::now();
        info!("开始执行任务: {} ({})", task.name, task.kind.as_str());

        // 建议性前置步骤：失败只进日志，任务体照常执行
        let fetch = self.fetcher.fetch().await;
        if !fetch.errors.is_empty() {
            warn!("任务 {} 预下载存在错误: {}", task.name, fetch.summary());
        }

        let outcome = match self.executor.execute(&task, &fetch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("任务 {} 执行失败: {}", task.name, e);
                JobOutcome::failed(e.to_string())
            }
        };

        let firing = TaskFiring::from_outcome(&task, scheduled_at, started_at, &outcome);
        self.recorder.record_firing(&firing).await;
        if !outcome.rows.is_empty() {
            self.recorder.record_rows(&firing, &outcome.rows).await;
        }

        info!(
            "任务 {} 执行结束: {}, 耗时 {}ms",
            task.name,
            firing.outcome.as_str(),
            firing.execution_duration_ms()
        );
        // fetch在此处离开作用域，预下载的临时目录随之清理
        firing
    }

    async fn get_task(&self, task_id: i64) -> Option<TaskConfig> {
        self.tasks.read().await.get(&task_id).cloned()
    }
}

#[async_trait]
impl JobControlService for JobScheduler {
    async fn trigger_by_id(&self, task_id: i64) -> Result<TaskFiring> {
        let task = self
            .inner
            .get_task(task_id)
            .await
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;
        if !task.is_enabled() {
            return Err(SchedulerError::TaskDisabled { name: task.name });
        }
        info!("手动触发任务: {} (ID: {})", task.name, task_id);
        Ok(self.inner.execute_firing(task, Utc::now()).await)
    }

    async fn trigger_by_name(&self, name: &str) -> Result<TaskFiring> {
        let task = {
            let tasks = self.inner.tasks.read().await;
            tasks.values().find(|t| t.name == name).cloned()
        };
        let task = task.ok_or_else(|| SchedulerError::TaskNotFoundByName {
            name: name.to_string(),
        })?;
        if !task.is_enabled() {
            return Err(SchedulerError::TaskDisabled { name: task.name });
        }
        info!("手动触发任务: {} (ID: {})", task.name, task.id);
        Ok(self.inner.execute_firing(task, Utc::now()).await)
    }

    /// 启用/禁用任务。禁用只抑制后续的到期事件，在途实例照常跑完
    async fn set_enabled(&self, task_id: i64, enabled: bool) -> Result<()> {
        let mut tasks = self.inner.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;
        task.enabled = enabled;
        info!("任务 {} 已{}", task.name, if enabled { "启用" } else { "禁用" });
        Ok(())
    }

    async fn list_tasks(&self) -> Vec<TaskConfig> {
        let tasks = self.inner.tasks.read().await;
        let mut list: Vec<TaskConfig> = tasks.values().cloned().collect();
        list.sort_by_key(|t| t.id);
        list
    }
}
