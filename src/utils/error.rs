use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl DiagnosisError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DiagnosisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DiagnosisError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            DiagnosisError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DiagnosisError::ImageDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DiagnosisError::Base64(_) => StatusCode::BAD_REQUEST,
            DiagnosisError::Json(_) => StatusCode::BAD_REQUEST,
            DiagnosisError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DiagnosisError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DiagnosisError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            DiagnosisError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            DiagnosisError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            DiagnosisError::Inference(_) => "INFERENCE_ERROR",
            DiagnosisError::InvalidInput(_) => "INVALID_INPUT",
            DiagnosisError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            DiagnosisError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            DiagnosisError::Catalog(_) => "CATALOG_ERROR",
            DiagnosisError::Config(_) => "CONFIG_ERROR",
            DiagnosisError::Io(_) => "IO_ERROR",
            DiagnosisError::Json(_) => "JSON_ERROR",
            DiagnosisError::Base64(_) => "BASE64_DECODE_ERROR",
            DiagnosisError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            DiagnosisError::Ort(_) => "ORT_ERROR",
            DiagnosisError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for DiagnosisError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}
