//! Error types for the expense classifier

use thiserror::Error;

/// Result type alias for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Error, Debug)]
pub enum ClassifierError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ClassifierError {
    /// True for errors the caller caused (bad input), as opposed to provider
    /// or storage failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClassifierError::ValidationError(_))
    }
}
