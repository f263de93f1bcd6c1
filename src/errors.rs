//! Error types for the rate-limited pool

use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by resource factories and validators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared form of a collaborator error so [`PoolError`] stays `Clone`
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A single consistency violation in a pool configuration or snapshot
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("max_concurrent must be a positive integer, got {0}")]
    InvalidConcurrentLimit(usize),

    #[error("pool_size must be a positive integer, got {0}")]
    InvalidPoolSize(usize),

    #[error("max_concurrent ({max_concurrent}) cannot exceed pool_size ({pool_size})")]
    ConcurrentExceedsPoolSize {
        max_concurrent: usize,
        pool_size: usize,
    },

    #[error("{in_use} resources in use exceeds max_concurrent ({max_concurrent})")]
    InUseExceedsConcurrent { in_use: usize, max_concurrent: usize },

    #[error("available permits ({available_permits}) outside 0..={max_concurrent}")]
    InvalidPermitCount {
        available_permits: usize,
        max_concurrent: usize,
    },

    #[error("{held} permits held by checkouts and pending acquires exceeds {max_concurrent}")]
    PermitsOvercommitted { held: usize, max_concurrent: usize },

    #[error("min_size ({min_size}) cannot exceed max_size ({max_size})")]
    MinExceedsMaxSize { min_size: usize, max_size: usize },
}

impl ValidationError {
    /// Stable machine-readable code for this violation
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidConcurrentLimit(_) => "invalid_concurrent_limit",
            ValidationError::InvalidPoolSize(_) => "invalid_pool_size",
            ValidationError::ConcurrentExceedsPoolSize { .. } => "concurrent_exceeds_pool_size",
            ValidationError::InUseExceedsConcurrent { .. } => "in_use_exceeds_concurrent",
            ValidationError::InvalidPermitCount { .. } => "invalid_permit_count",
            ValidationError::PermitsOvercommitted { .. } => "permits_overcommitted",
            ValidationError::MinExceedsMaxSize { .. } => "min_exceeds_max_size",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(ValidationError),

    #[error("Pool is exhausted - no valid resource available despite a granted permit")]
    PoolExhausted,

    #[error("Resource is not checked out from this pool")]
    NotInUse,

    #[error("Resource factory failed: {0}")]
    Factory(SharedError),

    #[error("Resource validator failed: {0}")]
    Validator(SharedError),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Reserved for a closed semaphore. The pool never closes its own
    /// semaphore, so no current code path returns this.
    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    pub(crate) fn factory(err: BoxError) -> Self {
        PoolError::Factory(Arc::from(err))
    }

    pub(crate) fn validator(err: BoxError) -> Self {
        PoolError::Validator(Arc::from(err))
    }

    /// Whether retrying the whole acquisition could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted
                | PoolError::Factory(_)
                | PoolError::Validator(_)
                | PoolError::Timeout(_)
        )
    }
}

impl From<ValidationError> for PoolError {
    fn from(err: ValidationError) -> Self {
        PoolError::InvalidConfiguration(err)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes() {
        assert_eq!(ValidationError::InvalidPoolSize(0).code(), "invalid_pool_size");
        assert_eq!(
            ValidationError::ConcurrentExceedsPoolSize {
                max_concurrent: 10,
                pool_size: 5
            }
            .code(),
            "concurrent_exceeds_pool_size"
        );
    }

    #[test]
    fn test_configuration_error_names_both_values() {
        let err = PoolError::from(ValidationError::ConcurrentExceedsPoolSize {
            max_concurrent: 10,
            pool_size: 5,
        });
        let message = err.to_string();
        assert!(message.contains("10"));
        assert!(message.contains("5"));
    }

    #[test]
    fn test_factory_error_is_retryable() {
        let err = PoolError::factory("connection refused".into());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection refused"));
        assert!(!PoolError::NotInUse.is_retryable());
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let err = PoolError::Cancelled;
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Operation was cancelled");
    }

    #[test]
    fn test_overcommit_reports_held_permits() {
        let err = ValidationError::PermitsOvercommitted {
            held: 3,
            max_concurrent: 2,
        };
        assert_eq!(err.code(), "permits_overcommitted");
        assert!(err.to_string().starts_with("3 permits held"));
    }
}
