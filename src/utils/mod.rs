pub mod error;

pub use error::DiagnosisError;
