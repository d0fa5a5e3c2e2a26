//! Engine error taxonomy.

use std::path::PathBuf;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A loaded artifact disagrees with the extractor currently in use. Never coerced.
    #[error("Feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Model not fitted: {model}")]
    NotFitted { model: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Insufficient training data: minimum {min} samples required, got {actual}")]
    InsufficientData { min: usize, actual: usize },

    /// Bundle missing, unreadable or corrupt. Callers may degrade to rule-based scoring.
    #[error("Model bundle unavailable at {path}: {reason}")]
    BundleUnavailable { path: PathBuf, reason: String },

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_fitted(model: impl Into<String>) -> Self {
        Self::NotFitted { model: model.into() }
    }

    /// True for errors the detection service recovers from by switching to rules.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BundleUnavailable { .. })
    }
}
