use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Local persistence failure. Never retried by the queue logic; retrying
    /// cannot fix unavailable local storage.
    #[error("storage error: {0}")]
    Storage(String),

    /// The remote authority was unreachable or the request timed out.
    #[error("network error: {0}")]
    Network(String),

    /// The remote authority answered but declined the request (non-2xx or
    /// `success: false`). Retryable like a network failure.
    #[error("server rejected request: {0}")]
    Rejected(String),

    /// Malformed action kind or payload. Rejected synchronously, never
    /// persisted.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a failed remote attempt should count against the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Rejected(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_network_and_rejection_only() {
        assert!(AppError::Network("timeout".into()).is_retryable());
        assert!(AppError::Rejected("HTTP 503".into()).is_retryable());
        assert!(!AppError::Storage("disk full".into()).is_retryable());
        assert!(!AppError::Validation("bad kind".into()).is_retryable());
    }

    #[test]
    fn sqlx_errors_map_to_storage() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
