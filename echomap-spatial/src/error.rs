//! Error types for the hex-window analysis core.

use thiserror::Error;

/// Analysis errors.
///
/// The taxonomy is deliberately small: base-layer read/normalization
/// failures, rejected request parameters, and unexpected geometry/transform
/// failures. Nothing in the core recovers silently; every failure aborts
/// the query and propagates to the caller.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The base layer cannot be read or normalized. Names the offending
    /// source so operators can tell a missing sync from a corrupt layer.
    #[error("failed to read base layer {source_name}: {message}")]
    DataSource {
        source_name: String,
        message: String,
    },

    /// A request parameter is outside the supported range and clamping
    /// cannot make sense of it (e.g. an unsupported grid resolution).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unexpected failure during geometry construction, union/intersection,
    /// or coordinate transform. Carries the pipeline stage for diagnosis.
    #[error("processing error at {stage}: {message}")]
    Processing { stage: String, message: String },
}

impl AnalysisError {
    /// Create a data-source error naming the offending source.
    pub fn data_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        AnalysisError::DataSource {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        AnalysisError::InvalidParameter(message.into())
    }

    /// Create a processing error with stage context.
    pub fn processing(stage: impl Into<String>, message: impl Into<String>) -> Self {
        AnalysisError::Processing {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
