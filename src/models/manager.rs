use crate::config::{Config, OnnxConfig};
use crate::models::artifact::{ensure_local, ArtifactFetcher, HttpFetcher};
use crate::models::{ModelProvider, OnnxClassifier};
use crate::utils::error::DiagnosisError;
use crate::Result;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// 构造模型实例（首次使用时调用）
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn ModelProvider>>;

    fn describe(&self) -> String;
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<Arc<dyn ModelProvider>> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn ModelProvider>> {
        self()
    }

    fn describe(&self) -> String {
        "custom loader".to_string()
    }
}

/// 本地 ONNX 文件，缺失时从远程下载
pub struct OnnxModelLoader {
    model_path: PathBuf,
    url: Option<String>,
    fetcher: Box<dyn ArtifactFetcher>,
    onnx_config: OnnxConfig,
}

impl OnnxModelLoader {
    pub fn new(
        model_path: PathBuf,
        url: Option<String>,
        fetcher: Box<dyn ArtifactFetcher>,
        onnx_config: OnnxConfig,
    ) -> Self {
        Self {
            model_path,
            url,
            fetcher,
            onnx_config,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.model_path(),
            config.model_source.url.clone(),
            Box::new(HttpFetcher::new(Duration::from_secs(
                config.model_source.download_timeout,
            ))),
            config.onnx_config.clone(),
        )
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Arc<dyn ModelProvider>> {
        let path = ensure_local(&self.model_path, self.url.as_deref(), self.fetcher.as_ref())?;
        let classifier = OnnxClassifier::from_file(&path, &self.onnx_config)?;
        Ok(Arc::new(classifier))
    }

    fn describe(&self) -> String {
        self.model_path.display().to_string()
    }
}

/// 模型句柄缓存
///
/// 首次使用时加载并缓存；加载失败不会被缓存，下一次请求会重新尝试。
pub struct ModelManager {
    loader: Box<dyn ModelLoader>,
    provider: OnceCell<Arc<dyn ModelProvider>>,
    expected_classes: usize,
    last_error: Mutex<Option<String>>,
}

impl ModelManager {
    pub fn new(loader: impl ModelLoader + 'static, expected_classes: usize) -> Self {
        Self {
            loader: Box::new(loader),
            provider: OnceCell::new(),
            expected_classes,
            last_error: Mutex::new(None),
        }
    }

    /// 获取模型，必要时加载
    ///
    /// 会阻塞（下载 + 加载），在异步上下文中应放入 `spawn_blocking`。
    pub fn provider(&self) -> Result<Arc<dyn ModelProvider>> {
        let result = self.provider.get_or_try_init(|| {
            tracing::info!("Loading model from {}", self.loader.describe());
            let provider = self.loader.load()?;
            self.check_cardinality(provider.as_ref())?;
            tracing::info!("Model '{}' loaded successfully", provider.name());
            Ok::<_, DiagnosisError>(provider)
        });

        match result {
            Ok(provider) => {
                *self.last_error.lock() = None;
                Ok(Arc::clone(provider))
            }
            Err(e) => {
                tracing::warn!("Model load failed: {}", e);
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// 记录加载失败；并发请求已加载成功时不覆盖
    fn record_failure(&self, error: &DiagnosisError) {
        let mut last_error = self.last_error.lock();
        if !self.is_loaded() {
            *last_error = Some(error.to_string());
        }
    }

    fn check_cardinality(&self, provider: &dyn ModelProvider) -> Result<()> {
        match provider.num_classes() {
            Some(n) if n != self.expected_classes => Err(DiagnosisError::ModelLoad(format!(
                "Model '{}' produces {} classes but the catalog defines {}",
                provider.name(),
                n,
                self.expected_classes
            ))),
            Some(_) => Ok(()),
            None => {
                tracing::warn!(
                    "Model '{}' does not declare its output size, checking per prediction",
                    provider.name()
                );
                Ok(())
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.provider.get().is_some()
    }

    /// 启动时预加载，失败只记录日志
    pub fn warm_up(&self) {
        if let Err(e) = self.provider() {
            tracing::warn!("Model preload failed, will retry on first request: {}", e);
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// 模型健康检查：未加载不算失败，上一次加载失败则报告
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");
        match (self.is_loaded(), self.last_error()) {
            (false, Some(error)) => Err(DiagnosisError::ModelUnavailable(error)),
            _ => Ok(()),
        }
    }

    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            loaded: self.is_loaded(),
            model_name: self.provider.get().map(|p| p.name().to_string()),
            source: self.loader.describe(),
            expected_classes: self.expected_classes,
            last_error: self.last_error(),
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub loaded: bool,
    pub model_name: Option<String>,
    pub source: String,
    pub expected_classes: usize,
    pub last_error: Option<String>,
}
