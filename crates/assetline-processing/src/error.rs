use assetline_storage::StorageError;
use thiserror::Error;

/// Processor failures
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{service} failed: {message}")]
    ProviderFailed {
        service: &'static str,
        message: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ProcessingError {
    pub(crate) fn provider(service: &'static str, message: impl Into<String>) -> Self {
        ProcessingError::ProviderFailed {
            service,
            message: message.into(),
        }
    }
}

/// Result type for processor operations
pub type ProcessingResult<T> = Result<T, ProcessingError>;
