use crate::utils::error::DiagnosisError;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 远程模型文件的获取方式
pub trait ArtifactFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// 单次 HTTP GET 下载，只接受 200
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ArtifactFetcher for HttpFetcher {
    // 阻塞客户端，只能在 spawn_blocking 等非异步上下文中调用
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| DiagnosisError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| DiagnosisError::ModelUnavailable(format!("Download from {} failed: {}", url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DiagnosisError::ModelUnavailable(format!(
                "Download from {} returned HTTP {}",
                url, status
            )));
        }

        let bytes = response.bytes().map_err(|e| {
            DiagnosisError::ModelUnavailable(format!("Failed to read model download: {}", e))
        })?;

        Ok(bytes.to_vec())
    }
}

/// 确保模型文件在本地存在，缺失时下载一次
///
/// 下载内容先写入 `<path>.part`，完整写入后再重命名为 `path`。
pub fn ensure_local(path: &Path, url: Option<&str>, fetcher: &dyn ArtifactFetcher) -> Result<PathBuf> {
    if path.is_file() {
        tracing::debug!("Model artifact found at {}", path.display());
        return Ok(path.to_path_buf());
    }

    let url = url.ok_or_else(|| {
        DiagnosisError::ModelUnavailable(format!(
            "Model not found at {} and no download URL is configured",
            path.display()
        ))
    })?;

    tracing::info!("Model not found at {}, downloading from {}", path.display(), url);

    let bytes = fetcher.fetch(url)?;
    if bytes.is_empty() {
        return Err(DiagnosisError::ModelUnavailable(format!(
            "Download from {} returned an empty body",
            url
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = fs::write(&partial, &bytes).and_then(|_| fs::rename(&partial, path)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }

    tracing::info!("Model downloaded: {} bytes -> {}", bytes.len(), path.display());
    Ok(path.to_path_buf())
}
