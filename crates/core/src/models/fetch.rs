use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempDir;

/// UNL文件预下载配置
///
/// 进程生命周期内不可变，启动时加载一次，所有任务共享同一份配置。
/// `file_names` 同时是请求的文件清单和固定的目标集合：文件名按
/// 大小写不敏感的精确匹配过滤，集合之外的名字直接跳过，不算错误。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSpec {
    /// 下载接口地址
    pub download_url: String,
    /// 目标文件名清单（有序）
    #[serde(default)]
    pub file_names: Vec<String>,
    /// 文件服务器标识
    pub file_server_id: String,
    /// 远端发布路径
    pub remote_publish_path: String,
    /// 单次下载请求的超时（秒）。预下载必须有界，否则就不再是
    /// 非阻塞的前置步骤
    pub timeout_seconds: u64,
}

impl Default for FetchSpec {
    fn default() -> Self {
        Self {
            download_url: String::new(),
            file_names: Vec::new(),
            file_server_id: String::new(),
            remote_publish_path: String::new(),
            timeout_seconds: 300,
        }
    }
}

impl FetchSpec {
    /// 检查配置是否完整；不完整时预下载整体跳过
    pub fn is_configured(&self) -> bool {
        !self.download_url.is_empty()
            && !self.file_names.is_empty()
            && !self.file_server_id.is_empty()
            && !self.remote_publish_path.is_empty()
    }

    /// 文件名是否命中目标集合（大小写不敏感的精确匹配）
    pub fn matches_target(&self, name: &str) -> bool {
        self.file_names
            .iter()
            .any(|target| target.eq_ignore_ascii_case(name))
    }
}

/// 预下载步骤的结果
///
/// 预下载是建议性步骤：所有失败模式都收敛到 `errors` 里并记录日志，
/// 绝不向调用方抛出，也绝不阻止任务体执行。
///
/// 临时目录句柄随本结构一起存活：执行实例结束（无论成败）后本结构
/// 被丢弃，下载产物随之删除。
#[derive(Debug)]
pub struct FetchOutcome {
    /// 是否实际发起了下载
    pub attempted: bool,
    /// 成功落盘的文件名
    pub downloaded: Vec<String>,
    /// 未命中目标集合而被跳过的文件名
    pub skipped: Vec<String>,
    /// 失败信息（网络错误、非2xx响应、响应中缺文件等）
    pub errors: Vec<String>,
    temp_dir: Option<TempDir>,
}

impl FetchOutcome {
    /// 配置不完整或预下载被禁用时的空结果
    pub fn not_attempted() -> Self {
        Self {
            attempted: false,
            downloaded: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            temp_dir: None,
        }
    }

    pub fn attempted_in(temp_dir: TempDir) -> Self {
        Self {
            attempted: true,
            downloaded: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            temp_dir: Some(temp_dir),
        }
    }

    /// 下载产物所在的临时目录
    pub fn artifact_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(|dir| dir.path())
    }

    /// 单行摘要，用于日志
    pub fn summary(&self) -> String {
        format!(
            "attempted={}, downloaded={}, skipped={}, errors={}",
            self.attempted,
            self.downloaded.len(),
            self.skipped.len(),
            self.errors.len()
        )
    }
}
