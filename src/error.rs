use thiserror::Error;

/// Application-wide error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Reading from or writing to the document store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Reading from or writing to the search index failed.
    #[error("Index error: {0}")]
    Index(String),

    /// Malformed request, rejected before any backend call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown match type or term type.
    #[error("Unsupported query shape: {0}")]
    UnsupportedQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable category used in HTTP error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Store(_) => "store",
            AppError::Index(_) => "index",
            AppError::Validation(_) => "validation",
            AppError::UnsupportedQuery(_) => "unsupported_query",
            AppError::NotFound(_) => "not_found",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Helper conversion from anyhow::Error
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
