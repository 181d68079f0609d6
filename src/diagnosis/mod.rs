pub mod catalog;
pub mod health;
pub mod mapper;
pub mod pipeline;
pub mod types;

pub use catalog::DiseaseCatalog;
pub use health::HealthPolicy;
pub use mapper::ResultMapper;
pub use pipeline::DiagnosisPipeline;
pub use types::{
    Candidate, ClassLabel, Diagnosis, DiagnosisOutcome, DiagnosisStage, DiagnosisStats,
    DiagnosisStatus, DiseaseInfo, HealthStatus, PredictionResult, ProbabilityVector,
};
