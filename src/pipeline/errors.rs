//! Error types for the render pipeline domain

use thiserror::Error;

/// Errors that can occur across the render pipeline
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Admission error: {0}")]
    Admission(String),

    #[error("Submit error: {0}")]
    Submit(String),

    #[error("Poll error: {0}")]
    Poll(String),

    #[error("Brand analysis error: {0}")]
    Analysis(String),

    #[error("Compositing error: {0}")]
    Compositing(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {0}s waiting for generation")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RenderError {
    /// HTTP status an API layer should map this error to
    pub fn http_status(&self) -> u16 {
        match self {
            RenderError::Validation(_) => 400,
            RenderError::NotFound(_) => 404,
            RenderError::Admission(_) => 429,
            RenderError::Timeout(_) => 504,
            RenderError::Submit(_) | RenderError::Poll(_) | RenderError::Analysis(_) => 502,
            _ => 500,
        }
    }
}

impl From<rusqlite::Error> for RenderError {
    fn from(err: rusqlite::Error) -> Self {
        RenderError::Repository(err.to_string())
    }
}

impl From<r2d2::Error> for RenderError {
    fn from(err: r2d2::Error) -> Self {
        RenderError::Repository(err.to_string())
    }
}
