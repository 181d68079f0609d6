use anyhow::Result;
use std::path::PathBuf;

use crate::diagnosis::HealthPolicy;

/// 默认模型文件名
pub const DEFAULT_MODEL_FILE: &str = "leaf_classifier.onnx";

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 模型来源（本地文件 + 远程下载地址）
    pub model_source: ModelSourceConfig,

    /// 页面配置
    pub ui_config: UiConfig,

    /// 自定义病害目录（JSON），为空时使用内置目录
    pub catalog_path: Option<PathBuf>,

    /// 健康判定策略
    pub health_policy: HealthPolicy,

    /// 模型输入边长
    pub image_size: u32,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别 (0-3)
    pub optimization_level: i32,

    /// 启用图优化
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 单张图片最大字节数
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ModelSourceConfig {
    /// 模型文件名（位于 models_dir 下）
    pub file_name: String,

    /// 本地缺失时的下载地址
    pub url: Option<String>,

    /// 下载超时（秒）
    pub download_timeout: u64,

    /// 启动时预加载模型
    pub preload: bool,
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    /// 选择图片后自动分析（否则需要点击按钮）
    pub auto_analyze: bool,

    /// 加载动画最短显示时间（毫秒）
    pub min_spinner_ms: u64,

    /// 启动时内联到页面的样式表
    pub stylesheet_path: Option<PathBuf>,

    /// 返回的候选类别数量
    pub top_k: usize,
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
            enable_optimization: true,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 }, // 开发模式更长超时
            max_request_size: 25 * 1024 * 1024,
            max_image_bytes: 20 * 1024 * 1024,
        };

        let model_source = ModelSourceConfig {
            file_name: DEFAULT_MODEL_FILE.to_string(),
            url: None,
            download_timeout: 120,
            preload: false,
        };

        let ui_config = UiConfig {
            auto_analyze: false,
            min_spinner_ms: 1000,
            stylesheet_path: Some(PathBuf::from("static/style.css")),
            top_k: 3,
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            workers,
            dev_mode,
            onnx_config,
            server_config,
            model_source,
            ui_config,
            catalog_path: None,
            health_policy: HealthPolicy::default(),
            image_size: 224,
        })
    }

    pub fn with_model_file(mut self, file_name: impl Into<String>) -> Self {
        self.model_source.file_name = file_name.into();
        self
    }

    pub fn with_model_url(mut self, url: Option<String>) -> Self {
        self.model_source.url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.model_source.preload = preload;
        self
    }

    pub fn with_catalog(mut self, path: Option<PathBuf>) -> Self {
        self.catalog_path = path;
        self
    }

    pub fn with_health_policy(mut self, policy: HealthPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    pub fn with_stylesheet(mut self, path: Option<PathBuf>) -> Self {
        self.ui_config.stylesheet_path = path;
        self
    }

    pub fn with_auto_analyze(mut self, auto_analyze: bool) -> Self {
        self.ui_config.auto_analyze = auto_analyze;
        self
    }

    pub fn with_min_spinner_ms(mut self, ms: u64) -> Self {
        self.ui_config.min_spinner_ms = ms;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.ui_config.top_k = top_k.max(1);
        self
    }

    /// 获取分类模型路径
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_source.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("127.0.0.1:8501".into(), "models".into(), Some(2), false).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.image_size, 224);
        assert_eq!(config.server_config.request_timeout, 60);
        assert_eq!(config.model_path(), PathBuf::from("models").join(DEFAULT_MODEL_FILE));
        assert!(config.model_source.url.is_none());
        assert!(config.onnx_config.intra_threads >= 1);
    }

    #[test]
    fn test_blank_url_is_ignored() {
        let config = Config::new("127.0.0.1:8501".into(), "models".into(), None, true)
            .unwrap()
            .with_model_url(Some("  ".into()))
            .with_model_file("plant.onnx");
        assert!(config.model_source.url.is_none());
        assert_eq!(config.server_config.request_timeout, 300);
        assert!(config.model_path().ends_with("plant.onnx"));
    }
}
