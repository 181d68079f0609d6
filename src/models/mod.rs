pub mod artifact;
pub mod classifier;
pub mod manager;
pub mod provider;

pub use artifact::{ArtifactFetcher, HttpFetcher};
pub use classifier::OnnxClassifier;
pub use manager::{ModelLoader, ModelManager, ModelStats, OnnxModelLoader};
pub use provider::ModelProvider;
