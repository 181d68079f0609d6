pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::{
    diagnosis::{DiagnosisPipeline, DiseaseCatalog, ResultMapper},
    image::{ImageLoader, ImagePreprocessor},
    models::{ModelManager, OnnxModelLoader},
    utils::error::DiagnosisError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<DiagnosisPipeline>,
    /// 启动时渲染好的首页
    pub page: Arc<String>,
}

impl AppState {
    pub fn new(config: Config, pipeline: DiagnosisPipeline) -> Self {
        let stylesheet = ui::load_stylesheet(config.ui_config.stylesheet_path.as_deref());
        let page = ui::render_index(
            &config.ui_config,
            pipeline.mapper().catalog().len(),
            &stylesheet,
        );

        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            page: Arc::new(page),
        }
    }

    /// 按配置构建完整的诊断流水线
    pub fn from_config(config: Config) -> Result<Self> {
        let catalog = Arc::new(DiseaseCatalog::load(config.catalog_path.as_deref())?);
        tracing::info!(
            "Disease catalog loaded: {} classes, {} entries",
            catalog.len(),
            catalog.entry_count()
        );

        let models = Arc::new(ModelManager::new(
            OnnxModelLoader::from_config(&config),
            catalog.len(),
        ));
        let mapper = ResultMapper::new(Arc::clone(&catalog), config.health_policy)
            .with_top_k(config.ui_config.top_k);
        let pipeline = DiagnosisPipeline::new(
            ImageLoader::new(config.server_config.max_image_bytes),
            ImagePreprocessor::new(config.image_size),
            models,
            mapper,
        );

        Ok(Self::new(config, pipeline))
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let preload = config.model_source.preload;
    let state = AppState::from_config(config)?;

    if preload {
        tracing::info!("Preloading model...");
        let pipeline = Arc::clone(&state.pipeline);
        tokio::task::spawn_blocking(move || pipeline.models().warm_up())
            .await
            .map_err(|e| DiagnosisError::Internal(format!("Model preload task failed: {}", e)))?;
    }

    // 解析绑定地址
    let addr: SocketAddr = state.config.bind_addr.parse().map_err(|e| {
        DiagnosisError::Config(format!(
            "Invalid bind address {}: {}",
            state.config.bind_addr, e
        ))
    })?;

    let app = create_app(state);

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /                - Web UI");
    tracing::info!("  POST /diagnose        - JSON base64 upload");
    tracing::info!("  POST /diagnose/upload - Multipart file upload");
    tracing::info!("  POST /diagnose/panel  - Multipart upload, HTML result panel");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/info        - Service information");
    tracing::info!("  GET  /api/classes     - Disease classes");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DiagnosisError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DiagnosisError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        // 诊断API
        .route("/diagnose", post(handlers::diagnose_json_handler))
        .route("/diagnose/upload", post(handlers::diagnose_upload_handler))
        .route("/diagnose/panel", post(handlers::diagnose_panel_handler))
        // Web UI
        .route("/", get(ui::index_handler))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .route("/api/classes", get(handlers::classes_handler))
        // 请求体上限由 RequestBodyLimitLayer 统一控制
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        .layer(CorsLayer::permissive())
        .layer(from_fn(middleware::security_headers))
        .layer(from_fn(middleware::request_logging))
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let models = state.pipeline.models();
    models.health_check()?;

    Ok(Json(json!({
        "status": "healthy",
        "model_loaded": models.is_loaded(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pipeline.models().get_stats();
    let mapper = state.pipeline.mapper();

    Json(json!({
        "service": "Leaf Disease Diagnosis Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": stats,
        "classes": mapper.catalog().len(),
        "catalog_entries": mapper.catalog().entry_count(),
        "health_policy": mapper.policy().as_str(),
        "input_size": state.config.image_size,
        "features": {
            "camera_capture": true,
            "auto_analyze": state.config.ui_config.auto_analyze,
            "top_k": state.config.ui_config.top_k
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::ProbabilityVector;
    use crate::image::ImageTensor;
    use crate::models::ModelProvider;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use base64::{engine::general_purpose, Engine as _};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "leaf-test-boundary";

    struct StubModel {
        winner: usize,
        classes: usize,
    }

    impl ModelProvider for StubModel {
        fn predict(&self, _tensor: &ImageTensor) -> Result<ProbabilityVector> {
            let mut scores = vec![0.0; self.classes];
            scores[self.winner] = 0.85;
            scores[(self.winner + 1) % self.classes] = 0.15;
            Ok(ProbabilityVector::new(scores))
        }

        fn num_classes(&self) -> Option<usize> {
            Some(self.classes)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn test_config() -> Config {
        Config::new("127.0.0.1:0".to_string(), "models".to_string(), Some(1), false)
            .unwrap()
            .with_stylesheet(None)
    }

    fn app_with(loader: impl crate::models::ModelLoader + 'static) -> Router {
        let catalog = Arc::new(DiseaseCatalog::builtin().unwrap());
        let models = Arc::new(ModelManager::new(loader, catalog.len()));
        let pipeline = DiagnosisPipeline::new(
            ImageLoader::default(),
            ImagePreprocessor::default(),
            models,
            ResultMapper::new(catalog, Default::default()),
        );
        create_app(AppState::new(test_config(), pipeline))
    }

    fn app_predicting(winner: usize) -> Router {
        app_with(move || -> Result<Arc<dyn ModelProvider>> {
            Ok(Arc::new(StubModel { winner, classes: 38 }))
        })
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(64, 48, Rgb([90, 140, 50]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn multipart_body(fields: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, data) in fields {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"leaf.png\"\r\n",
                    name
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(uri: &str, fields: &[(&str, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields)))
            .unwrap()
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let response = app_predicting(0)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        let html = body_string(response).await;
        assert!(html.contains("capture=\"environment\""));
        assert!(!html.contains("{{"));
    }

    #[tokio::test]
    async fn test_diagnose_json() {
        let encoded = general_purpose::STANDARD.encode(png_bytes());
        let request = json_request(
            "/diagnose",
            json!({ "image": format!("data:image/png;base64,{}", encoded) }),
        );

        let response = app_predicting(30).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["diagnosis"]["prediction"]["label"], "Tomato___Late_blight");
        assert_eq!(body["data"]["diagnosis"]["confidence_display"], "85.00%");
        assert_eq!(body["data"]["diagnosis"]["status"], "diseased");
    }

    #[tokio::test]
    async fn test_diagnose_json_rejects_empty_image() {
        let response = app_predicting(0)
            .oneshot(json_request("/diagnose", json!({ "image": "" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_diagnose_upload_last_field_wins() {
        let image = png_bytes();
        let request = multipart_request(
            "/diagnose/upload",
            &[("file", b"not an image"), ("camera", &image)],
        );

        let response = app_predicting(37).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["data"]["diagnosis"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_diagnose_upload_without_image() {
        let response = app_predicting(0)
            .oneshot(multipart_request("/diagnose/upload", &[("note", b"hello")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("INVALID_INPUT"));
    }

    #[tokio::test]
    async fn test_panel_renders_diagnosis() {
        let image = png_bytes();
        let response = app_predicting(30)
            .oneshot(multipart_request("/diagnose/panel", &[("file", &image)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("disease-bg"));
        assert!(html.contains("Tomato___Late_blight"));
        assert!(html.contains("85.00%"));
        assert!(html.contains("copper-based fungicide"));
    }

    #[tokio::test]
    async fn test_panel_corrupt_image() {
        let response = app_predicting(0)
            .oneshot(multipart_request(
                "/diagnose/panel",
                &[("file", b"\x89PNG\r\n\x1a\ntruncated")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).await.contains("error-bg"));
    }

    #[tokio::test]
    async fn test_model_unavailable_and_health() {
        let app = app_with(|| -> Result<Arc<dyn ModelProvider>> {
            Err(DiagnosisError::ModelUnavailable("HTTP 404".to_string()))
        });

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let image = png_bytes();
        let response = app
            .clone()
            .oneshot(multipart_request("/diagnose/upload", &[("file", &image)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_string(response).await.contains("MODEL_UNAVAILABLE"));

        let health = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_classes_and_info() {
        let app = app_predicting(0);

        let response = app
            .clone()
            .oneshot(Request::get("/api/classes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["count"], 38);
        assert_eq!(body["classes"][30]["label"], "Tomato___Late_blight");
        assert_eq!(body["classes"][37]["healthy"], true);

        let response = app
            .oneshot(Request::get("/api/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["classes"], 38);
        assert_eq!(body["model"]["loaded"], false);
        assert_eq!(body["health_policy"], "substring");
    }
}
