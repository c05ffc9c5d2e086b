use thiserror::Error;

/// Typed error hierarchy for oxicrab.
///
/// Use at module boundaries (provider calls, tool execution, config validation, sessions).
/// Internal/leaf functions can continue using `anyhow::Result` — the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum OxicrabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Episodic memory pipeline error: {0}")]
    Etl(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OxicrabError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::RateLimit { .. } | Self::Internal(_) => true,
            Self::Auth(_) | Self::Config(_) | Self::Storage(_) | Self::Etl(_) => false,
        }
    }
}

/// Async error-reporting seam (spec.md §9 "Async error reporting seam").
///
/// Every background worker (ETL, event summarization, vectorization,
/// message tracker, logging sink) receives one of these at construction
/// instead of spawning ad hoc reporting tasks inline. The default
/// implementation just logs; production wiring can swap in one that posts
/// to a bug-report channel or error-tracking service.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &str, context: &str);
}

/// Default `ErrorReporter`: forwards to `tracing::error!`.
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &str, context: &str) {
        tracing::error!(context, error, "reported error");
    }
}
