use thiserror::Error;

use crate::SubIndex;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The series failed validation and no degraded run was requested.
    #[error("Validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("Missing sub-index score: {0}")]
    MissingSubScore(SubIndex),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
