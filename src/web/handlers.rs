use crate::{
    diagnosis::{DiagnosisOutcome, DiagnosisPipeline, DiagnosisStatus},
    utils::error::DiagnosisError,
    web::{extractors::{RequestId, ValidatedJson}, ui, AppState},
    Result,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::{Html, IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// 可以携带图片的 multipart 字段；多个字段时以最后一个为准
const IMAGE_FIELDS: [&str; 3] = ["file", "camera", "image"];

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct DiagnoseJsonRequest {
    /// Base64编码的图像数据，可带 data URL 前缀
    pub image: String,
}

/// JSON响应格式；失败时由 `DiagnosisError` 直接生成错误响应
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// JSON base64上传处理器
pub async fn diagnose_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<DiagnoseJsonRequest>,
) -> Result<Json<ApiResponse<DiagnosisOutcome>>> {
    let start_time = Instant::now();
    tracing::info!(
        "Processing JSON diagnosis request: request_id={}, payload={} chars",
        request_id,
        request.image.len()
    );

    let outcome = run_pipeline(&state, &request_id, move |pipeline, status_tx| {
        pipeline.run_base64(&request.image, status_tx)
    })
    .await?;

    tracing::info!(
        "JSON diagnosis completed: request_id={}, label={}, time={:.3}s",
        request_id,
        outcome.diagnosis.prediction.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(outcome, request_id)))
}

/// Multipart文件上传处理器
pub async fn diagnose_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: Multipart,
) -> Result<Json<ApiResponse<DiagnosisOutcome>>> {
    let start_time = Instant::now();
    tracing::info!("Processing multipart diagnosis request: request_id={}", request_id);

    let image_data = read_image_field(multipart).await?;
    let outcome = run_pipeline(&state, &request_id, move |pipeline, status_tx| {
        pipeline.run_bytes(&image_data, status_tx)
    })
    .await?;

    tracing::info!(
        "Upload diagnosis completed: request_id={}, label={}, time={:.3}s",
        request_id,
        outcome.diagnosis.prediction.label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(outcome, request_id)))
}

/// 页面使用的上传处理器：返回渲染好的结果面板
pub async fn diagnose_panel_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: Multipart,
) -> Response {
    let result = match read_image_field(multipart).await {
        Ok(image_data) => {
            run_pipeline(&state, &request_id, move |pipeline, status_tx| {
                pipeline.run_bytes(&image_data, status_tx)
            })
            .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => Html(ui::render_panel(&outcome.diagnosis)).into_response(),
        Err(e) => {
            tracing::error!("Panel request failed: request_id={}, error={}", request_id, e);
            (e.status_code(), Html(ui::render_error_panel(&e))).into_response()
        }
    }
}

/// 类别列表
pub async fn classes_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mapper = state.pipeline.mapper();
    let catalog = mapper.catalog();
    let policy = mapper.policy();

    let classes: Vec<serde_json::Value> = catalog
        .classes()
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let info = catalog.info(label);
            serde_json::json!({
                "index": index,
                "label": label,
                "display_name": info.map(|i| i.display_name.clone()).unwrap_or_else(|| label.humanize()),
                "healthy": policy.is_healthy(label),
                "has_entry": info.is_some(),
            })
        })
        .collect();

    Json(serde_json::json!({
        "count": catalog.len(),
        "health_policy": policy.as_str(),
        "classes": classes,
    }))
}

/// 从 multipart 中读取图片字段
async fn read_image_field(mut multipart: Multipart) -> Result<Bytes> {
    let mut image_data: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        DiagnosisError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if !IMAGE_FIELDS.contains(&field_name.as_str()) {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        if let Some(content_type) = field.content_type() {
            if !content_type.starts_with("image/") && content_type != "application/octet-stream" {
                return Err(DiagnosisError::UnsupportedFormat(content_type.to_string()));
            }
        }

        let data = field.bytes().await.map_err(|e| {
            DiagnosisError::InvalidInput(format!("Failed to read file data: {}", e))
        })?;

        // 浏览器对未选择的文件输入也会发送空字段
        if data.is_empty() {
            continue;
        }

        tracing::debug!("Received '{}' image: {} bytes", field_name, data.len());
        image_data = Some(data);
    }

    image_data.ok_or_else(|| DiagnosisError::InvalidInput("No image file provided".to_string()))
}

/// 在阻塞线程池中执行流水线；开发模式下记录阶段进度
async fn run_pipeline<F>(state: &AppState, request_id: &str, job: F) -> Result<DiagnosisOutcome>
where
    F: FnOnce(&DiagnosisPipeline, Option<mpsc::UnboundedSender<DiagnosisStatus>>) -> Result<DiagnosisOutcome>
        + Send
        + 'static,
{
    let status_tx = if state.config.dev_mode {
        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<DiagnosisStatus>();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                tracing::debug!(
                    "Diagnosis progress [{}]: {:?} - {:.1}% - {}",
                    request_id,
                    status.stage,
                    status.progress * 100.0,
                    status.message
                );
            }
        });
        Some(status_tx)
    } else {
        None
    };

    let pipeline = Arc::clone(&state.pipeline);
    tokio::task::spawn_blocking(move || job(&pipeline, status_tx))
        .await
        .map_err(|e| DiagnosisError::Internal(format!("Diagnosis task failed: {}", e)))?
}
