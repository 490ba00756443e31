use std::path::PathBuf;

use trackrefine_common::RefineError;

/// Errors that can occur when loading, validating, or writing track data.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} in column {column} at data row {row}")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Schema error: {message}")]
    Schema { message: String },
}

impl ModelError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }
}

impl From<ModelError> for RefineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Schema { message } => RefineError::Schema { message },
            ModelError::IoError { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                RefineError::FileNotFound { path }
            }
            other => RefineError::Other(anyhow::Error::new(other)),
        }
    }
}
