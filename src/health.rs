//! Health monitoring for rate-limited pools

use crate::pool::PoolSnapshot;
use crate::validation::validate_rate_limited_pool;

/// Utilization above which a pool is reported unhealthy
const HIGH_UTILIZATION: f64 = 0.9;

/// Health status of a pool derived from a snapshot
///
/// # Examples
///
/// ```
/// use esox_ratelimited_pool::{HealthStatus, PoolSnapshot};
///
/// let snapshot: PoolSnapshot<u32> = PoolSnapshot {
///     available: Vec::new(),
///     in_use: Vec::new(),
///     max_concurrent: 4,
///     pool_size: 8,
///     queued_waiters: 0,
///     in_flight: 0,
///     available_permits: 4,
/// };
///
/// let health = HealthStatus::from_snapshot(&snapshot);
/// assert!(health.is_healthy());
/// assert_eq!(health.available_permits, 4);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Checked-out share of `max_concurrent` (0.0 to 1.0)
    pub utilization: f64,

    /// Idle resources
    pub available_objects: usize,

    /// Checked-out resources
    pub in_use_objects: usize,

    /// Callers blocked on the semaphore
    pub queued_waiters: usize,

    /// Free permits
    pub available_permits: usize,

    /// Maximum distinct resources
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn from_snapshot<T>(snapshot: &PoolSnapshot<T>) -> Self {
        let utilization = snapshot.utilization();
        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > HIGH_UTILIZATION {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if snapshot.queued_waiters > 0 {
            warnings.push(format!("{} callers waiting for a permit", snapshot.queued_waiters));
        }

        let audit = validate_rate_limited_pool(snapshot);
        if !audit.valid {
            is_healthy = false;
            warnings.extend(audit.errors.iter().map(|err| format!("{}: {}", err.code(), err)));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available_objects: snapshot.available_count(),
            in_use_objects: snapshot.in_use_count(),
            queued_waiters: snapshot.queued_waiters,
            available_permits: snapshot.available_permits,
            total_capacity: snapshot.pool_size,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_saturated_pool_with_waiters() {
        let snapshot = PoolSnapshot {
            available: Vec::new(),
            in_use: vec![Arc::new(1u32), Arc::new(2u32)],
            max_concurrent: 2,
            pool_size: 5,
            queued_waiters: 3,
            in_flight: 0,
            available_permits: 0,
        };

        let health = HealthStatus::from_snapshot(&snapshot);
        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 2);
        assert!(health.warnings[0].starts_with("High utilization"));
        assert_eq!(health.queued_waiters, 3);
    }

    #[test]
    fn test_inconsistent_snapshot_is_unhealthy() {
        let snapshot: PoolSnapshot<u32> = PoolSnapshot {
            available: Vec::new(),
            in_use: Vec::new(),
            max_concurrent: 2,
            pool_size: 5,
            queued_waiters: 0,
            in_flight: 0,
            available_permits: 7,
        };

        let health = HealthStatus::from_snapshot(&snapshot);
        assert!(!health.is_healthy());
        assert!(health.warnings.iter().any(|w| w.starts_with("invalid_permit_count")));
    }
}
