use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use taskd_core::{ArtifactFetcher, FetchOutcome, FetchSpec};

/// UNL文件预下载服务
///
/// 每次任务触发前执行一次。向下载接口发送POST请求（文件清单、
/// 服务器标识、远端发布路径），把返回的压缩产物写入本次触发专属的
/// 临时目录。目录句柄装在 `FetchOutcome` 里，执行实例结束后随之
/// 删除，成功失败都一样。
///
/// 本服务永不失败：网络错误、非2xx响应、响应里缺文件，全部收敛为
/// `FetchOutcome.errors` 条目。
pub struct UnlFetcher {
    spec: FetchSpec,
    client: reqwest::Client,
}

impl UnlFetcher {
    pub fn new(spec: FetchSpec) -> Self {
        Self {
            spec,
            client: reqwest::Client::new(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.spec.timeout_seconds)
    }

    /// 发起下载请求并处理响应
    async fn download(&self, outcome: &mut FetchOutcome) {
        let payload = serde_json::json!({
            "fileNameList": self.spec.file_names,
            "fileSvrId": self.spec.file_server_id,
            "rmtPubPath": self.spec.remote_publish_path,
        });

        info!(
            "开始下载UNL文件: url={}, fileSvrId={}, {} 个目标文件",
            self.spec.download_url,
            self.spec.file_server_id,
            self.spec.file_names.len()
        );

        let response = match self
            .client
            .post(&self.spec.download_url)
            .timeout(self.timeout())
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                outcome.errors.push(format!("下载请求异常: {e}"));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            outcome
                .errors
                .push(format!("下载请求失败，状态码: {status}"));
            return;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                outcome.errors.push(format!("读取响应体失败: {e}"));
                return;
            }
        };

        // 压缩文件直接落盘；JSON响应则从中提取文件清单逐个下载
        if content_type.contains("gzip") || body.starts_with(&[0x1f, 0x8b]) {
            let file_name = format!("downloaded_{}.unl.gz", self.spec.file_server_id);
            self.write_artifact(outcome, &file_name, &body);
        } else {
            self.handle_json_response(outcome, &body).await;
        }
    }

    async fn handle_json_response(&self, outcome: &mut FetchOutcome, body: &[u8]) {
        let json: serde_json::Value = match serde_json::from_slice(body) {
            Ok(json) => json,
            Err(e) => {
                outcome.errors.push(format!("解析JSON响应失败: {e}"));
                return;
            }
        };

        let (artifacts, skipped) = Self::collect_artifacts(&self.spec, &json);
        outcome.skipped.extend(skipped);
        if artifacts.is_empty() && outcome.skipped.is_empty() {
            outcome
                .errors
                .push("响应中不包含可下载的文件信息".to_string());
            return;
        }

        for (file_name, url) in artifacts {
            match self.download_from_url(&url).await {
                Ok(bytes) => self.write_artifact(outcome, &file_name, &bytes),
                Err(e) => outcome.errors.push(format!("从 {url} 下载 {file_name} 失败: {e}")),
            }
        }
    }

    /// 从JSON响应中提取 (文件名, 下载地址) 清单
    ///
    /// 两种格式：`files` 数组（带fileName，按目标集合大小写不敏感
    /// 过滤，集合外的名字跳过不算错）；或裸的 `fileUrl`/`downloadUrl`
    /// 字段（字符串或数组，无名字可过滤）。
    fn collect_artifacts(
        spec: &FetchSpec,
        json: &serde_json::Value,
    ) -> (Vec<(String, String)>, Vec<String>) {
        let mut artifacts = Vec::new();
        let mut skipped = Vec::new();

        if let Some(files) = json.get("files").and_then(|v| v.as_array()) {
            for entry in files {
                let name = entry.get("fileName").and_then(|v| v.as_str());
                let url = entry
                    .get("fileUrl")
                    .or_else(|| entry.get("downloadUrl"))
                    .and_then(|v| v.as_str());
                match (name, url) {
                    (Some(name), Some(url)) if spec.matches_target(name) => {
                        artifacts.push((name.to_string(), url.to_string()));
                    }
                    (Some(name), _) => skipped.push(name.to_string()),
                    (None, _) => {}
                }
            }
            return (artifacts, skipped);
        }

        let urls = json
            .get("fileUrl")
            .or_else(|| json.get("downloadUrl"))
            .map(|v| match v {
                serde_json::Value::String(s) => vec![s.clone()],
                serde_json::Value::Array(arr) => arr
                    .iter()
                    .filter_map(|u| u.as_str().map(|s| s.to_string()))
                    .collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default();
        for (idx, url) in urls.into_iter().enumerate() {
            artifacts.push((format!("downloaded_file_{idx}.unl.gz"), url));
        }
        (artifacts, skipped)
    }

    async fn download_from_url(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("状态码: {status}"));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }

    fn write_artifact(&self, outcome: &mut FetchOutcome, file_name: &str, bytes: &[u8]) {
        let Some(dir) = outcome.artifact_dir().map(|d| d.to_path_buf()) else {
            outcome
                .errors
                .push(format!("临时目录不可用，丢弃 {file_name}"));
            return;
        };
        let path = dir.join(file_name);
        match std::fs::write(&path, bytes) {
            Ok(()) => {
                info!("UNL文件已保存到: {}", path.display());
                outcome.downloaded.push(file_name.to_string());
            }
            Err(e) => outcome
                .errors
                .push(format!("写入文件 {file_name} 失败: {e}")),
        }
    }
}

#[async_trait]
impl ArtifactFetcher for UnlFetcher {
    async fn fetch(&self) -> FetchOutcome {
        if !self.spec.is_configured() {
            warn!("UNL下载配置不完整，跳过预下载");
            return FetchOutcome::not_attempted();
        }

        let mut outcome = match tempfile::tempdir() {
            Ok(dir) => FetchOutcome::attempted_in(dir),
            Err(e) => {
                let mut outcome = FetchOutcome::not_attempted();
                outcome.attempted = true;
                outcome.errors.push(format!("创建临时目录失败: {e}"));
                return outcome;
            }
        };

        self.download(&mut outcome).await;
        info!("UNL预下载完成: {}", outcome.summary());
        outcome
    }
}
