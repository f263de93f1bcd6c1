//! Consistency auditing for pool snapshots
//!
//! Nothing on the acquire/release path calls into this module. It exists
//! for tests and debugging.

use crate::errors::ValidationError;
use crate::pool::PoolSnapshot;

/// Outcome of auditing a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Codes of every violation, in check order
    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(ValidationError::code).collect()
    }
}

/// Audit a snapshot, collecting every violated invariant
///
/// # Examples
///
/// ```
/// use esox_ratelimited_pool::{validate_rate_limited_pool, PoolSnapshot};
///
/// let snapshot: PoolSnapshot<u32> = PoolSnapshot {
///     available: Vec::new(),
///     in_use: Vec::new(),
///     max_concurrent: 10,
///     pool_size: 5,
///     queued_waiters: 0,
///     in_flight: 0,
///     available_permits: 11,
/// };
///
/// let result = validate_rate_limited_pool(&snapshot);
/// assert!(!result.valid);
/// assert_eq!(result.codes(), vec!["concurrent_exceeds_pool_size", "invalid_permit_count"]);
/// ```
pub fn validate_rate_limited_pool<T>(snapshot: &PoolSnapshot<T>) -> ValidationResult {
    let mut errors = Vec::new();

    if snapshot.max_concurrent == 0 {
        errors.push(ValidationError::InvalidConcurrentLimit(snapshot.max_concurrent));
    }
    if snapshot.pool_size == 0 {
        errors.push(ValidationError::InvalidPoolSize(snapshot.pool_size));
    }
    if snapshot.max_concurrent > snapshot.pool_size {
        errors.push(ValidationError::ConcurrentExceedsPoolSize {
            max_concurrent: snapshot.max_concurrent,
            pool_size: snapshot.pool_size,
        });
    }
    if snapshot.in_use.len() > snapshot.max_concurrent {
        errors.push(ValidationError::InUseExceedsConcurrent {
            in_use: snapshot.in_use.len(),
            max_concurrent: snapshot.max_concurrent,
        });
    }
    let held = snapshot.in_use.len() + snapshot.in_flight;
    if held > snapshot.max_concurrent {
        errors.push(ValidationError::PermitsOvercommitted {
            held,
            max_concurrent: snapshot.max_concurrent,
        });
    }
    if snapshot.available_permits > snapshot.max_concurrent {
        errors.push(ValidationError::InvalidPermitCount {
            available_permits: snapshot.available_permits,
            max_concurrent: snapshot.max_concurrent,
        });
    }

    ValidationResult::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot(max_concurrent: usize, pool_size: usize) -> PoolSnapshot<u32> {
        PoolSnapshot {
            available: Vec::new(),
            in_use: Vec::new(),
            max_concurrent,
            pool_size,
            queued_waiters: 0,
            in_flight: 0,
            available_permits: max_concurrent,
        }
    }

    #[test]
    fn test_consistent_snapshot_is_valid() {
        let result = validate_rate_limited_pool(&snapshot(2, 5));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_zero_limits() {
        let result = validate_rate_limited_pool(&snapshot(0, 0));
        assert_eq!(result.codes(), vec!["invalid_concurrent_limit", "invalid_pool_size"]);
    }

    #[test]
    fn test_collects_all_violations() {
        let mut corrupt = snapshot(3, 2);
        corrupt.in_use = vec![Arc::new(1), Arc::new(2), Arc::new(3), Arc::new(4)];
        corrupt.available_permits = 4;

        let result = validate_rate_limited_pool(&corrupt);
        assert!(!result.valid);
        assert_eq!(
            result.codes(),
            vec![
                "concurrent_exceeds_pool_size",
                "in_use_exceeds_concurrent",
                "permits_overcommitted",
                "invalid_permit_count"
            ]
        );
        assert_eq!(
            result.errors[1],
            ValidationError::InUseExceedsConcurrent {
                in_use: 4,
                max_concurrent: 3
            }
        );
    }

    #[test]
    fn test_pending_acquires_count_against_limit() {
        let mut busy = snapshot(2, 5);
        busy.in_use = vec![Arc::new(1)];
        busy.in_flight = 1;
        busy.available_permits = 0;
        assert!(validate_rate_limited_pool(&busy).valid);

        busy.in_flight = 2;
        let result = validate_rate_limited_pool(&busy);
        assert_eq!(result.codes(), vec!["permits_overcommitted"]);
        assert_eq!(
            result.errors[0],
            ValidationError::PermitsOvercommitted {
                held: 3,
                max_concurrent: 2
            }
        );
    }
}
