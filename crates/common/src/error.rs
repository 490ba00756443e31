//! Error types shared across trackrefine crates.

use std::path::PathBuf;

/// Top-level error type for trackrefine operations.
#[derive(Debug, thiserror::Error)]
pub enum RefineError {
    /// Invalid, missing, or mutually exclusive options for a stage.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input table does not carry the columns a stage needs.
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RefineError.
pub type RefineResult<T> = Result<T, RefineError>;

impl RefineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    /// Whether this error is a configuration problem that would fail
    /// every file of a batch the same way.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
