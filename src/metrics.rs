//! Metrics collection and export for rate-limited pools

use crate::pool::PoolSnapshot;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_ratelimited_pool::{BoxError, FnFactory, RateLimitedPool, RateLimitedPoolOptions};
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// rt.block_on(async {
///     let factory = FnFactory::new(|| async { Ok::<_, BoxError>(1u8) });
///     let options = RateLimitedPoolOptions::new(factory)
///         .with_max_concurrent(2)
///         .with_pool_size(4);
///     let pool = RateLimitedPool::create(options).await.unwrap();
///
///     let acquired = pool.acquire().await.unwrap();
///     let metrics = pool.metrics();
///     assert_eq!(metrics.total_acquired, 1);
///     assert_eq!(metrics.in_use, 1);
///     assert_eq!(metrics.available_permits, 1);
///     pool.release(&acquired.resource).unwrap();
/// });
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Successful acquisitions
    pub total_acquired: usize,

    /// Successful releases
    pub total_released: usize,

    /// Resources created by the factory
    pub resources_created: usize,

    /// Idle resources rejected by the validator
    pub validation_rejections: usize,

    /// Factory calls that returned an error
    pub factory_failures: usize,

    /// Releases of resources that were not checked out
    pub release_errors: usize,

    /// Acquisitions abandoned by `acquire_timeout`
    pub timeouts: usize,

    /// Resources currently checked out
    pub in_use: usize,

    /// Resources currently idle
    pub available: usize,

    /// Callers waiting for a permit
    pub queued_waiters: usize,

    /// Free permits
    pub available_permits: usize,

    pub max_concurrent: usize,

    pub pool_size: usize,

    /// Checked-out share of `max_concurrent` (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("resources_created".to_string(), self.resources_created.to_string());
        metrics.insert("validation_rejections".to_string(), self.validation_rejections.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("release_errors".to_string(), self.release_errors.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("queued_waiters".to_string(), self.queued_waiters.to_string());
        metrics.insert("available_permits".to_string(), self.available_permits.to_string());
        metrics.insert("max_concurrent".to_string(), self.max_concurrent.to_string());
        metrics.insert("pool_size".to_string(), self.pool_size.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus the given tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_ratelimited_pool::{BoxError, FnFactory, RateLimitedPool, RateLimitedPoolOptions};
    /// use std::collections::HashMap;
    ///
    /// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    /// let pool = rt
    ///     .block_on(RateLimitedPool::create(RateLimitedPoolOptions::new(FnFactory::new(|| async {
    ///         Ok::<_, BoxError>(1u8)
    ///     }))))
    ///     .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags));
    /// assert!(output.contains("ratelimitedpool_resources_in_use"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        Self::render(metrics, pool_name, tags).unwrap_or_else(|err| {
            tracing::warn!(error = %err, pool = pool_name, "failed to render prometheus metrics");
            String::new()
        })
    }

    fn render(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = HashMap::new();
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        labels.insert("pool".to_string(), pool_name.to_string());
        let registry =
            Registry::new_custom(Some("ratelimitedpool".to_string()), Some(labels))?;

        let gauges = [
            ("resources_in_use", "Checked-out resources", metrics.in_use),
            ("resources_available", "Idle resources", metrics.available),
            ("queued_waiters", "Callers waiting for a permit", metrics.queued_waiters),
            ("permits_available", "Free permits", metrics.available_permits),
            ("max_concurrent", "Permit count", metrics.max_concurrent),
            ("pool_size", "Maximum distinct resources", metrics.pool_size),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::new(name, help)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let counters = [
            ("acquired_total", "Successful acquisitions", metrics.total_acquired),
            ("released_total", "Successful releases", metrics.total_released),
            ("resources_created_total", "Resources created", metrics.resources_created),
            (
                "validation_rejections_total",
                "Idle resources rejected",
                metrics.validation_rejections,
            ),
            ("factory_failures_total", "Factory errors", metrics.factory_failures),
            ("release_errors_total", "Releases of unknown resources", metrics.release_errors),
            ("timeouts_total", "Acquisitions that timed out", metrics.timeouts),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let utilization = Gauge::new("utilization", "Checked-out share of max_concurrent")?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub resources_created: AtomicUsize,
    pub validation_rejections: AtomicUsize,
    pub factory_failures: AtomicUsize,
    pub release_errors: AtomicUsize,
    pub timeouts: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metrics<T>(&self, snapshot: &PoolSnapshot<T>) -> PoolMetrics {
        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            resources_created: self.resources_created.load(Ordering::Relaxed),
            validation_rejections: self.validation_rejections.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            release_errors: self.release_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            in_use: snapshot.in_use_count(),
            available: snapshot.available_count(),
            queued_waiters: snapshot.queued_waiters,
            available_permits: snapshot.available_permits,
            max_concurrent: snapshot.max_concurrent,
            pool_size: snapshot.pool_size,
            utilization: snapshot.utilization(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot() -> PoolSnapshot<u32> {
        PoolSnapshot {
            available: vec![Arc::new(1)],
            in_use: vec![Arc::new(2), Arc::new(3)],
            max_concurrent: 4,
            pool_size: 8,
            queued_waiters: 0,
            in_flight: 0,
            available_permits: 2,
        }
    }

    #[test]
    fn test_tracker_combines_counters_and_snapshot() {
        let tracker = MetricsTracker::new();
        tracker.total_acquired.fetch_add(3, Ordering::Relaxed);
        tracker.total_released.fetch_add(1, Ordering::Relaxed);

        let metrics = tracker.get_metrics(&snapshot());
        assert_eq!(metrics.total_acquired, 3);
        assert_eq!(metrics.total_released, 1);
        assert_eq!(metrics.in_use, 2);
        assert_eq!(metrics.available, 1);
        assert!((metrics.utilization - 0.5).abs() < f64::EPSILON);

        let exported = metrics.export();
        assert_eq!(exported["utilization"], "0.50");
        assert_eq!(exported["available_permits"], "2");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsTracker::new().get_metrics(&snapshot());
        let output = MetricsExporter::export_prometheus(&metrics, "db", None);

        assert!(output.contains("# TYPE ratelimitedpool_resources_in_use gauge"));
        assert!(output.contains("ratelimitedpool_resources_in_use{pool=\"db\"} 2"));
        assert!(output.contains("# TYPE ratelimitedpool_acquired_total counter"));
    }
}
