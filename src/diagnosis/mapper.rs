use super::catalog::DiseaseCatalog;
use super::health::HealthPolicy;
use super::types::{
    Candidate, ClassLabel, Diagnosis, HealthStatus, PredictionResult, ProbabilityVector,
};
use crate::utils::error::DiagnosisError;
use crate::Result;
use std::sync::Arc;

/// 将模型输出的概率向量映射为诊断结果
#[derive(Debug, Clone)]
pub struct ResultMapper {
    catalog: Arc<DiseaseCatalog>,
    policy: HealthPolicy,
    top_k: usize,
}

impl ResultMapper {
    pub fn new(catalog: Arc<DiseaseCatalog>, policy: HealthPolicy) -> Self {
        Self {
            catalog,
            policy,
            top_k: 3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn catalog(&self) -> &DiseaseCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }

    pub fn map(&self, vector: &ProbabilityVector) -> Result<Diagnosis> {
        if vector.len() != self.catalog.len() {
            return Err(DiagnosisError::Inference(format!(
                "Model returned {} scores but the catalog defines {} classes",
                vector.len(),
                self.catalog.len()
            )));
        }

        let (index, confidence) = vector.argmax().ok_or_else(|| {
            DiagnosisError::Inference("Probability vector has no valid scores".to_string())
        })?;

        let sum = vector.sum();
        if (sum - 1.0).abs() > 0.01 {
            tracing::debug!("Probability vector sums to {:.4}, expected softmax output", sum);
        }

        let label = self.label_at(index)?;
        let prediction = PredictionResult {
            label: label.clone(),
            index,
            confidence,
        };

        let info = self.catalog.info(label).cloned();
        let status = if self.policy.is_healthy(label) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Diseased
        };

        let advisory = match (&status, &info) {
            (HealthStatus::Healthy, _) => self.catalog.healthy_advisory().to_string(),
            (HealthStatus::Diseased, Some(info)) => info.cure.clone(),
            (HealthStatus::Diseased, None) => {
                tracing::debug!("No catalog entry for '{}', using fallback advisory", label);
                self.catalog.fallback_advisory().to_string()
            }
        };

        let display_name = info
            .as_ref()
            .map(|info| info.display_name.clone())
            .unwrap_or_else(|| label.humanize());

        let top_k = vector
            .top_k(self.top_k)
            .into_iter()
            .map(|(i, confidence)| {
                self.label_at(i).map(|label| Candidate {
                    label: label.clone(),
                    confidence,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Diagnosis {
            confidence_display: prediction.confidence_percent(),
            prediction,
            status,
            display_name,
            advisory,
            info,
            top_k,
        })
    }

    fn label_at(&self, index: usize) -> Result<&ClassLabel> {
        self.catalog.label_at(index).ok_or_else(|| {
            DiagnosisError::Inference(format!("Class index {} is outside the catalog", index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::catalog::{FALLBACK_ADVISORY, HEALTHY_ADVISORY};
    use crate::diagnosis::types::DiseaseInfo;
    use std::collections::HashMap;

    fn info(name: &str, cure: &str) -> DiseaseInfo {
        DiseaseInfo {
            display_name: name.to_string(),
            description: format!("{} description", name),
            cure: cure.to_string(),
            reference_image_url: None,
        }
    }

    /// 小型目录：index 2 = Tomato___Late_blight，index 3 有专门条目但属于健康类
    fn small_catalog() -> Arc<DiseaseCatalog> {
        let labels = [
            "Apple___Apple_scab",
            "Corn___Common_rust",
            "Tomato___Late_blight",
            "Tomato___healthy",
            "Grape___Esca",
        ];
        let classes: Vec<ClassLabel> = labels.iter().map(|l| ClassLabel::new(*l).unwrap()).collect();

        let mut entries = HashMap::new();
        entries.insert(classes[0].clone(), info("Apple Scab", "Use fungicides and remove infected leaves."));
        entries.insert(classes[1].clone(), info("Common Rust", "Plant resistant hybrids."));
        entries.insert(
            classes[2].clone(),
            info("Tomato Late Blight", "Remove infected leaves and apply a copper-based fungicide."),
        );
        entries.insert(classes[3].clone(), info("Healthy Tomato", "Spray something anyway."));

        Arc::new(DiseaseCatalog::new(classes, entries, HEALTHY_ADVISORY, FALLBACK_ADVISORY).unwrap())
    }

    fn mapper() -> ResultMapper {
        ResultMapper::new(small_catalog(), HealthPolicy::Substring)
    }

    #[test]
    fn test_late_blight_scenario() {
        let vector = ProbabilityVector::new(vec![0.1, 0.05, 0.85, 0.0, 0.0]);
        let diagnosis = mapper().map(&vector).unwrap();

        assert_eq!(diagnosis.prediction.label.as_str(), "Tomato___Late_blight");
        assert_eq!(diagnosis.prediction.index, 2);
        assert_eq!(diagnosis.prediction.confidence, 0.85);
        assert_eq!(diagnosis.status, HealthStatus::Diseased);
        assert_eq!(diagnosis.advisory, "Remove infected leaves and apply a copper-based fungicide.");
        assert_eq!(diagnosis.confidence_display, "85.00%");
        assert_eq!(diagnosis.display_name, "Tomato Late Blight");
    }

    #[test]
    fn test_healthy_overrides_specific_entry() {
        let vector = ProbabilityVector::new(vec![0.01, 0.01, 0.02, 0.95, 0.01]);
        let diagnosis = mapper().map(&vector).unwrap();

        assert_eq!(diagnosis.prediction.label.as_str(), "Tomato___healthy");
        assert_eq!(diagnosis.status, HealthStatus::Healthy);
        assert_eq!(diagnosis.advisory, HEALTHY_ADVISORY);
        assert_eq!(diagnosis.info.unwrap().cure, "Spray something anyway.");
    }

    #[test]
    fn test_missing_entry_uses_fallback() {
        let vector = ProbabilityVector::new(vec![0.0, 0.1, 0.1, 0.1, 0.7]);
        let diagnosis = mapper().map(&vector).unwrap();

        assert_eq!(diagnosis.prediction.label.as_str(), "Grape___Esca");
        assert_eq!(diagnosis.advisory, FALLBACK_ADVISORY);
        assert!(diagnosis.info.is_none());
        assert_eq!(diagnosis.display_name, "Grape - Esca");
    }

    #[test]
    fn test_tie_selects_lower_index() {
        let vector = ProbabilityVector::new(vec![0.1, 0.4, 0.4, 0.05, 0.05]);
        let diagnosis = mapper().map(&vector).unwrap();
        assert_eq!(diagnosis.prediction.index, 1);
        assert_eq!(diagnosis.prediction.label.as_str(), "Corn___Common_rust");
    }

    #[test]
    fn test_map_is_idempotent() {
        let mapper = mapper();
        let vector = ProbabilityVector::new(vec![0.2, 0.3, 0.1, 0.15, 0.25]);
        assert_eq!(mapper.map(&vector).unwrap(), mapper.map(&vector).unwrap());
    }

    #[test]
    fn test_top_k_candidates() {
        let vector = ProbabilityVector::new(vec![0.1, 0.05, 0.6, 0.2, 0.05]);
        let diagnosis = mapper().with_top_k(2).map(&vector).unwrap();
        let labels: Vec<&str> = diagnosis.top_k.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Tomato___Late_blight", "Tomato___healthy"]);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let err = mapper().map(&ProbabilityVector::new(vec![0.5, 0.5])).unwrap_err();
        assert_eq!(err.error_code(), "INFERENCE_ERROR");

        let err = mapper().map(&ProbabilityVector::new(vec![])).unwrap_err();
        assert_eq!(err.error_code(), "INFERENCE_ERROR");
    }

    #[test]
    fn test_all_nan_is_error() {
        let vector = ProbabilityVector::new(vec![f32::NAN; 5]);
        assert!(mapper().map(&vector).is_err());
    }

    #[test]
    fn test_sentinel_policy_treats_capitalized_label_as_diseased() {
        let classes = vec![
            ClassLabel::new("Corn___Healthy").unwrap(),
            ClassLabel::new("Corn___Common_rust").unwrap(),
        ];
        let catalog = Arc::new(
            DiseaseCatalog::new(classes, HashMap::new(), HEALTHY_ADVISORY, FALLBACK_ADVISORY).unwrap(),
        );
        let vector = ProbabilityVector::new(vec![0.9, 0.1]);

        let substring = ResultMapper::new(catalog.clone(), HealthPolicy::Substring).map(&vector).unwrap();
        assert_eq!(substring.advisory, HEALTHY_ADVISORY);

        let sentinel = ResultMapper::new(catalog, HealthPolicy::Sentinel).map(&vector).unwrap();
        assert_eq!(sentinel.status, HealthStatus::Diseased);
        assert_eq!(sentinel.advisory, FALLBACK_ADVISORY);
    }

    #[test]
    fn test_builtin_healthy_classes() {
        let catalog = Arc::new(DiseaseCatalog::builtin().unwrap());
        let mapper = ResultMapper::new(catalog.clone(), HealthPolicy::Substring);

        for (index, label) in catalog.classes().iter().enumerate() {
            let mut scores = vec![0.0; catalog.len()];
            scores[index] = 1.0;
            let diagnosis = mapper.map(&ProbabilityVector::new(scores)).unwrap();
            if label.as_str().ends_with("healthy") {
                assert_eq!(diagnosis.advisory, HEALTHY_ADVISORY, "{}", label);
            } else {
                assert_eq!(diagnosis.advisory, catalog.info(label).unwrap().cure, "{}", label);
            }
        }
    }
}
