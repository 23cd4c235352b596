use thiserror::Error;
use std::io;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Field access error on '{field}': {message}")]
    FieldAccess { field: String, message: String },

    #[error("Similarity error: {0}")]
    Similarity(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Operation cancelled")]
    Cancelled,
}

// Type alias for Result
pub type Result<T> = std::result::Result<T, Error>;

// Helper functions for common error conversions
impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn field_access<F: Into<String>, S: Into<String>>(field: F, msg: S) -> Self {
        Error::FieldAccess {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn similarity<S: Into<String>>(msg: S) -> Self {
        Error::Similarity(msg.into())
    }

    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Error::Allocation(msg.into())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool(format!("Thread pool build failed: {}", err))
    }
}
