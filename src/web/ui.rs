use crate::{
    config::UiConfig,
    diagnosis::Diagnosis,
    utils::error::DiagnosisError,
    web::AppState,
};
use axum::{extract::State, response::Html};
use std::path::Path;

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");

/// 内置默认样式
const DEFAULT_STYLESHEET: &str = include_str!("../../static/style.css");

/// 首页处理器
pub async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(state.page.as_ref().clone())
}

/// 读取样式表；文件缺失或不可读时使用内置样式
pub fn load_stylesheet(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_STYLESHEET.to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(css) => {
            tracing::info!("Stylesheet loaded from {}", path.display());
            css
        }
        Err(e) => {
            tracing::warn!(
                "Stylesheet {} not available ({}), using built-in style",
                path.display(),
                e
            );
            DEFAULT_STYLESHEET.to_string()
        }
    }
}

/// 渲染首页
pub fn render_index(ui: &UiConfig, class_count: usize, stylesheet: &str) -> String {
    INDEX_TEMPLATE
        .replace("{{AUTO_ANALYZE}}", if ui.auto_analyze { "true" } else { "false" })
        .replace("{{MIN_SPINNER_MS}}", &ui.min_spinner_ms.to_string())
        .replace("{{CLASS_COUNT}}", &class_count.to_string())
        .replace("{{VERSION}}", env!("CARGO_PKG_VERSION"))
        // 样式最后替换，避免样式内容中的占位符被误替换
        .replace("{{STYLESHEET}}", stylesheet)
}

/// 渲染诊断结果面板
pub fn render_panel(diagnosis: &Diagnosis) -> String {
    let mut html = format!(
        r#"<div class="result-panel {} fade-in">
  <h2 class="result-label">{}</h2>
  <p class="result-prediction">Prediction: <code>{}</code></p>
  <p class="result-confidence">Confidence: {}</p>
  <p class="result-advisory"><strong>{}</strong> {}</p>
"#,
        diagnosis.status.css_class(),
        escape_html(&diagnosis.display_name),
        escape_html(diagnosis.prediction.label.as_str()),
        escape_html(&diagnosis.confidence_display),
        if diagnosis.status.is_healthy() { "Status:" } else { "Treatment:" },
        escape_html(&diagnosis.advisory),
    );

    if let Some(info) = &diagnosis.info {
        if !info.description.is_empty() {
            html.push_str(&format!(
                "  <p class=\"result-description\">{}</p>\n",
                escape_html(&info.description)
            ));
        }
        if let Some(url) = &info.reference_image_url {
            html.push_str(&format!(
                "  <img class=\"result-reference\" src=\"{}\" alt=\"{}\">\n",
                escape_html(url),
                escape_html(&info.display_name)
            ));
        }
    }

    if diagnosis.top_k.len() > 1 {
        html.push_str("  <ol class=\"result-candidates\">\n");
        for candidate in &diagnosis.top_k {
            html.push_str(&format!(
                "    <li>{} <span>{:.2}%</span></li>\n",
                escape_html(&candidate.label.humanize()),
                candidate.confidence as f64 * 100.0
            ));
        }
        html.push_str("  </ol>\n");
    }

    html.push_str("</div>\n");
    html
}

/// 渲染错误面板
pub fn render_error_panel(error: &DiagnosisError) -> String {
    let hint = match error {
        DiagnosisError::ModelUnavailable(_) | DiagnosisError::ModelLoad(_) => {
            "The classifier model is not available right now. Please try again later."
        }
        DiagnosisError::ImageDecode(_) | DiagnosisError::UnsupportedFormat(_) => {
            "The image could not be read. Please upload a JPEG or PNG photo of a leaf."
        }
        DiagnosisError::FileTooLarge(_, _) => "The image is too large. Please use a smaller photo.",
        DiagnosisError::InvalidInput(_) => "Please choose or capture an image first.",
        _ => "Something went wrong while analyzing the image.",
    };

    format!(
        r#"<div class="result-panel error-bg fade-in">
  <h2 class="result-label">Diagnosis failed</h2>
  <p class="result-advisory">{}</p>
  <p class="result-error"><code>{}</code> {}</p>
</div>
"#,
        hint,
        error.error_code(),
        escape_html(&error.to_string())
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
