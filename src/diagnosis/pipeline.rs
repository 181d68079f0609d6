use crate::diagnosis::{
    DiagnosisOutcome, DiagnosisStage, DiagnosisStats, DiagnosisStatus, ResultMapper,
};
use crate::image::{ImageLoader, ImagePreprocessor};
use crate::models::ModelManager;
use crate::Result;
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 诊断流水线：解码 -> 预处理 -> 推理 -> 结果映射
///
/// 所有步骤都是同步且 CPU 密集的，web 层通过 `spawn_blocking` 调用。
pub struct DiagnosisPipeline {
    loader: ImageLoader,
    preprocessor: ImagePreprocessor,
    models: Arc<ModelManager>,
    mapper: ResultMapper,
}

impl DiagnosisPipeline {
    pub fn new(
        loader: ImageLoader,
        preprocessor: ImagePreprocessor,
        models: Arc<ModelManager>,
        mapper: ResultMapper,
    ) -> Self {
        Self {
            loader,
            preprocessor,
            models,
            mapper,
        }
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    pub fn mapper(&self) -> &ResultMapper {
        &self.mapper
    }

    /// 处理上传的原始字节
    pub fn run_bytes(
        &self,
        bytes: &[u8],
        status_tx: Option<mpsc::UnboundedSender<DiagnosisStatus>>,
    ) -> Result<DiagnosisOutcome> {
        let start_time = Instant::now();
        send_status(&status_tx, DiagnosisStage::Decoding, 0.1, "Decoding image");

        let image = self.loader.from_bytes(bytes)?;
        self.run_decoded(&image, status_tx, start_time)
    }

    /// 处理base64图像
    pub fn run_base64(
        &self,
        base64_data: &str,
        status_tx: Option<mpsc::UnboundedSender<DiagnosisStatus>>,
    ) -> Result<DiagnosisOutcome> {
        let start_time = Instant::now();
        send_status(&status_tx, DiagnosisStage::Decoding, 0.1, "Decoding base64 image");

        let image = self.loader.from_base64(base64_data)?;
        self.run_decoded(&image, status_tx, start_time)
    }

    fn run_decoded(
        &self,
        image: &DynamicImage,
        status_tx: Option<mpsc::UnboundedSender<DiagnosisStatus>>,
        start_time: Instant,
    ) -> Result<DiagnosisOutcome> {
        let decode_time = start_time.elapsed();

        send_status(&status_tx, DiagnosisStage::Preprocessing, 0.3, "Resizing and normalizing");
        let preprocess_start = Instant::now();
        let tensor = self.preprocessor.preprocess(image)?;
        let preprocess_time = preprocess_start.elapsed();

        send_status(&status_tx, DiagnosisStage::Inference, 0.5, "Running classifier");
        let provider = self.models.provider()?;
        let inference_start = Instant::now();
        let probabilities = provider.predict(&tensor)?;
        let inference_time = inference_start.elapsed();

        send_status(&status_tx, DiagnosisStage::Mapping, 0.9, "Mapping prediction");
        let mapping_start = Instant::now();
        let diagnosis = self.mapper.map(&probabilities)?;
        let mapping_time = mapping_start.elapsed();

        let total_time = start_time.elapsed();
        send_status(
            &status_tx,
            DiagnosisStage::Completed,
            1.0,
            &format!("Diagnosis completed: {}", diagnosis.prediction.label),
        );

        tracing::info!(
            "Diagnosis completed: label={}, confidence={}, status={:?}, total_time={:.3}s",
            diagnosis.prediction.label,
            diagnosis.confidence_display,
            diagnosis.status,
            total_time.as_secs_f32()
        );

        Ok(DiagnosisOutcome {
            diagnosis,
            stats: DiagnosisStats {
                decode_ms: millis(decode_time),
                preprocess_ms: millis(preprocess_time),
                inference_ms: millis(inference_time),
                mapping_ms: millis(mapping_time),
                total_ms: millis(total_time),
            },
        })
    }
}

fn send_status(
    status_tx: &Option<mpsc::UnboundedSender<DiagnosisStatus>>,
    stage: DiagnosisStage,
    progress: f32,
    message: &str,
) {
    if let Some(tx) = status_tx {
        let _ = tx.send(DiagnosisStatus::new(stage, progress, message));
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
