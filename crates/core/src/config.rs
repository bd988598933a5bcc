use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::FetchSpec;

/// 应用配置
///
/// 启动时构造一次的不可变配置值，显式传递给各组件，核心逻辑中不做任何
/// 隐式的全局查找。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
    pub fetch: FetchSpec,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 调度循环的评估间隔（秒）
    pub poll_interval_seconds: u64,
    /// stop() 等待在途执行实例结束的超时（秒）
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
}

/// 批量API调用的默认参数，可被任务参数覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://taskd.db".to_string(),
                max_connections: 5,
            },
            scheduler: SchedulerConfig {
                poll_interval_seconds: 1,
                shutdown_timeout_seconds: 30,
            },
            api: ApiConfig {
                enabled: true,
                bind_address: "0.0.0.0:5000".to_string(),
            },
            fetch: FetchSpec::default(),
            batch: BatchConfig {
                max_retries: 2,
                retry_backoff_ms: 1000,
                request_timeout_seconds: 60,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 < TOML文件 < TASKD_*环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("构造默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        }

        // 环境变量覆盖，例如 TASKD_DATABASE__URL、TASKD_FETCH__FILE_NAMES
        builder = builder.add_source(
            Environment::with_prefix("TASKD")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("fetch.file_names"),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置的基本约束
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(anyhow::anyhow!("database.url 不能为空"));
        }
        if self.scheduler.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("scheduler.poll_interval_seconds 必须大于0"));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("fetch.timeout_seconds 必须大于0"));
        }
        Ok(())
    }
}
