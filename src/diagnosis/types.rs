use crate::utils::error::DiagnosisError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 健康类别的标记值
pub const HEALTHY_SENTINEL: &str = "healthy";

/// 植物名与病害名之间的分隔符
pub const LABEL_SEPARATOR: &str = "___";

/// 类别标签，形如 `Tomato___Late_blight`，或单独的 `healthy`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(DiagnosisError::Catalog("Class label cannot be empty".to_string()));
        }
        if trimmed != raw || raw.chars().any(char::is_whitespace) {
            return Err(DiagnosisError::Catalog(format!(
                "Class label '{}' contains whitespace",
                raw
            )));
        }

        match raw.split_once(LABEL_SEPARATOR) {
            Some((plant, condition)) if !plant.is_empty() && !condition.is_empty() => {}
            Some(_) => {
                return Err(DiagnosisError::Catalog(format!(
                    "Class label '{}' must look like <Plant>{}<Condition>",
                    raw, LABEL_SEPARATOR
                )));
            }
            None if raw == HEALTHY_SENTINEL => {}
            None => {
                return Err(DiagnosisError::Catalog(format!(
                    "Class label '{}' must look like <Plant>{}<Condition> or be '{}'",
                    raw, LABEL_SEPARATOR, HEALTHY_SENTINEL
                )));
            }
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 植物名（`healthy` 标记没有植物部分）
    pub fn plant(&self) -> Option<&str> {
        self.0.split_once(LABEL_SEPARATOR).map(|(plant, _)| plant)
    }

    /// 病害/状态部分
    pub fn condition(&self) -> &str {
        self.0
            .split_once(LABEL_SEPARATOR)
            .map(|(_, condition)| condition)
            .unwrap_or(&self.0)
    }

    /// 无目录条目时使用的可读名称，例如 `Tomato - Late blight`
    pub fn humanize(&self) -> String {
        let condition = self.condition().replace('_', " ");
        match self.plant() {
            Some(plant) => format!("{} - {}", plant.replace('_', " "), condition),
            None => condition,
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClassLabel {
    type Err = DiagnosisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClassLabel {
    type Error = DiagnosisError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ClassLabel> for String {
    fn from(label: ClassLabel) -> Self {
        label.0
    }
}

/// 病害说明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseInfo {
    pub display_name: String,
    pub description: String,
    pub cure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

/// 模型输出的概率向量，顺序与类别表一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().filter(|p| !p.is_nan()).sum()
    }

    /// 最高分的 (index, score)；同分取索引最小者，NaN 不参与比较
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;

        for (index, &score) in self.0.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }

        best
    }

    /// 按概率降序排列的前 k 个 (index, score)，同分时索引小的在前
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut indexed: Vec<(usize, f32)> = self
            .0
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| !p.is_nan())
            .collect();

        // sort_by 是稳定排序，同分保持索引顺序
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
        indexed
    }
}

impl From<Vec<f32>> for ProbabilityVector {
    fn from(scores: Vec<f32>) -> Self {
        Self::new(scores)
    }
}

/// 单次预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: ClassLabel,
    pub index: usize,
    pub confidence: f32,
}

impl PredictionResult {
    /// 置信度百分比，保留两位小数，例如 `85.00%`
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.confidence as f64 * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Diseased,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// 结果面板使用的样式类
    pub fn css_class(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy-bg",
            HealthStatus::Diseased => "disease-bg",
        }
    }
}

/// 候选类别
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: ClassLabel,
    pub confidence: f32,
}

/// 结果映射的完整输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub prediction: PredictionResult,
    pub status: HealthStatus,
    pub display_name: String,
    pub confidence_display: String,
    pub advisory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DiseaseInfo>,
    pub top_k: Vec<Candidate>,
}

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisStats {
    pub decode_ms: f64,
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub mapping_ms: f64,
    pub total_ms: f64,
}

/// 流水线一次运行的输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisOutcome {
    pub diagnosis: Diagnosis,
    pub stats: DiagnosisStats,
}

/// 流水线处理阶段
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosisStage {
    Decoding,
    Preprocessing,
    Inference,
    Mapping,
    Completed,
}

/// 流水线处理状态
#[derive(Debug, Clone)]
pub struct DiagnosisStatus {
    pub stage: DiagnosisStage,
    /// 进度 (0.0 - 1.0)
    pub progress: f32,
    pub message: String,
}

impl DiagnosisStatus {
    pub fn new(stage: DiagnosisStage, progress: f32, message: &str) -> Self {
        Self {
            stage,
            progress,
            message: message.to_string(),
        }
    }
}
