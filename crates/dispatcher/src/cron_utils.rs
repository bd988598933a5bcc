use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::warn;

use taskd_core::{Result, SchedulerError};

/// CRON表达式解析和调度工具
///
/// 接受标准的五段crontab表达式（分 时 日 月 周）和带秒的六/七段
/// 表达式；五段表达式在解析前补上秒位。
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> Result<Self> {
        let normalized = Self::normalize(cron_expr);
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { schedule })
    }

    /// 五段表达式补秒位，其余原样返回
    fn normalize(cron_expr: &str) -> String {
        let fields = cron_expr.split_whitespace().count();
        if fields == 5 {
            format!("0 {}", cron_expr.trim())
        } else {
            cron_expr.to_string()
        }
    }

    /// 检查给定时间是否应该触发任务
    pub fn should_trigger(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        // 从上次执行（或一分钟前）之后查找下一次执行时间
        let check_from = last_run.unwrap_or_else(|| now - Duration::minutes(1));
        match self.schedule.after(&check_from).next() {
            Some(next_time) => next_time <= now,
            None => {
                warn!("无法计算下一次执行时间");
                false
            }
        }
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> Result<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.schedule.after(&now).next().map(|next| next - now)
    }
}
