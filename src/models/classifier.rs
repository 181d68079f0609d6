use crate::config::OnnxConfig;
use crate::diagnosis::ProbabilityVector;
use crate::image::ImageTensor;
use crate::models::ModelProvider;
use crate::utils::error::DiagnosisError;
use crate::Result;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;

/// 基于 ONNX Runtime 的叶片病害分类器
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    num_classes: Option<usize>,
    name: String,
}

impl OnnxClassifier {
    pub fn from_file(model_path: &Path, onnx_config: &OnnxConfig) -> Result<Self> {
        if !model_path.is_file() {
            return Err(DiagnosisError::ModelLoad(format!(
                "Classification model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading classification model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(optimization_level(onnx_config))?
            .with_intra_threads(onnx_config.intra_threads)?
            .commit_from_file(model_path)
            .map_err(|e| {
                DiagnosisError::ModelLoad(format!(
                    "Failed to load {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(DiagnosisError::ModelLoad(
                    "Classification model has no inputs".to_string(),
                ))
            }
        };

        let output = session.outputs.first().ok_or_else(|| {
            DiagnosisError::ModelLoad("Classification model has no outputs".to_string())
        })?;
        let output_name = output.name.clone();

        // 输出形状通常为 [batch, num_classes]，batch 为动态维度
        let num_classes = output
            .output_type
            .tensor_shape()
            .and_then(|shape| shape.last().copied())
            .filter(|&dim| dim > 0)
            .map(|dim| dim as usize);

        tracing::info!(
            "Classification model: input='{}', output='{}', classes={:?}",
            input_name,
            output_name,
            num_classes
        );

        if let Some(shape) = session.inputs[0].input_type.tensor_shape() {
            tracing::debug!("Classification input shape: {:?}", shape);
            if shape.len() == 4 && shape[1] == 3 && shape[3] != 3 {
                tracing::warn!(
                    "Model input {:?} looks channels-first, but tensors are fed as NHWC",
                    shape
                );
            }
        }

        let name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx-classifier".to_string());

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            num_classes,
            name,
        })
    }
}

impl ModelProvider for OnnxClassifier {
    fn predict(&self, tensor: &ImageTensor) -> Result<ProbabilityVector> {
        let input_tensor = Tensor::from_array(tensor.view().to_owned())?;

        let predictions = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(self.output_name.as_str()) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(DiagnosisError::Inference(format!(
                        "Classification output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        let shape = predictions.shape().to_vec();
        match shape.as_slice() {
            [1, _] | [_] => {}
            _ => {
                return Err(DiagnosisError::Inference(format!(
                    "Expected classification output of shape [1, N], got {:?}",
                    shape
                )))
            }
        }

        Ok(ProbabilityVector::new(predictions.iter().copied().collect()))
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn optimization_level(config: &OnnxConfig) -> GraphOptimizationLevel {
    if !config.enable_optimization {
        return GraphOptimizationLevel::Disable;
    }
    match config.optimization_level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}
