//! Error types for the Threadmind domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`FailureClass`] is the
//! cross-cutting transient/terminal split the retry logic keys off.

use thiserror::Error;

/// The top-level error type for Threadmind operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network, quota, timeouts, lock contention; retry with backoff.
    Transient,
    /// Malformed input, dimension mismatch, auth; surface to the caller.
    Terminal,
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Server-suggested delay before retrying, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Vector dimension mismatch: index has {expected}, record has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Embedding failed: {0}")]
    Embedding(ProviderError),

    #[error("Summary generation failed: {0}")]
    Generation(ProviderError),

    #[error("Long-term store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Compaction skipped for session {session_id}: {source}")]
    CompactionSkipped {
        session_id: String,
        #[source]
        source: Box<MemoryError>,
    },
}

impl MemoryError {
    pub fn failure_class(&self) -> FailureClass {
        let transient = match self {
            Self::Embedding(e) | Self::Generation(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            Self::SessionNotFound(_) => false,
            Self::CompactionSkipped { source, .. } => {
                return source.failure_class();
            }
        };
        if transient {
            FailureClass::Transient
        } else {
            FailureClass::Terminal
        }
    }

    pub fn is_transient(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }

    /// Server-suggested retry delay carried by the underlying provider error.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Embedding(e) | Self::Generation(e) => e.retry_after_secs(),
            Self::CompactionSkipped { source, .. } => source.retry_after_secs(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn provider_errors_classify_by_cause() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::RateLimited { retry_after_secs: 2 }.is_transient());
        assert!(
            ProviderError::ApiError {
                status_code: 503,
                message: "overloaded".into()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::ApiError {
                status_code: 400,
                message: "bad input".into()
            }
            .is_transient()
        );
        assert!(!ProviderError::AuthenticationFailed("nope".into()).is_transient());
    }

    #[test]
    fn store_dimension_mismatch_is_terminal() {
        let err = MemoryError::Store(StoreError::DimensionMismatch {
            expected: 3,
            actual: 4,
        });
        assert_eq!(err.failure_class(), FailureClass::Terminal);
        assert!(err.to_string().contains("index has 3"));

        let err = MemoryError::Store(StoreError::Unavailable("locked".into()));
        assert_eq!(err.failure_class(), FailureClass::Transient);
    }

    #[test]
    fn compaction_skipped_inherits_class_of_cause() {
        let err = MemoryError::CompactionSkipped {
            session_id: "s1".into(),
            source: Box::new(MemoryError::Generation(ProviderError::Timeout(
                "30s".into(),
            ))),
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn session_not_found_is_terminal() {
        let err = MemoryError::SessionNotFound("ghost".into());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Session not found: ghost");
    }

    #[test]
    fn retry_after_is_surfaced_through_wrappers() {
        let err = MemoryError::Embedding(ProviderError::RateLimited { retry_after_secs: 7 });
        assert_eq!(err.retry_after_secs(), Some(7));
        assert_eq!(
            MemoryError::Store(StoreError::Unavailable("x".into())).retry_after_secs(),
            None
        );
    }
}
