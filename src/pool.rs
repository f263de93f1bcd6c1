//! Rate-limited resource pool

use crate::config::{LifecycleConfig, RateLimitedPoolOptions};
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::lifecycle::LifecyclePool;
use crate::metrics::PoolMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::validation::{validate_rate_limited_pool, ValidationResult};

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, info, trace, warn};

/// Immutable point-in-time view of a pool
///
/// Only the snapshot returned by the most recent operation is
/// authoritative; a snapshot never updates itself.
#[derive(Debug)]
pub struct PoolSnapshot<T> {
    /// Idle resources, most recently released first
    pub available: Vec<Arc<T>>,

    /// Checked-out resources
    pub in_use: Vec<Arc<T>>,

    /// Maximum simultaneous checkouts
    pub max_concurrent: usize,

    /// Maximum distinct resources
    pub pool_size: usize,

    /// Callers blocked waiting for a permit
    pub queued_waiters: usize,

    /// Callers holding a permit while their resource is validated or created
    pub in_flight: usize,

    /// Permits not bound to a checkout or to a caller already past the semaphore
    pub available_permits: usize,
}

impl<T> Clone for PoolSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            available: self.available.clone(),
            in_use: self.in_use.clone(),
            max_concurrent: self.max_concurrent,
            pool_size: self.pool_size,
            queued_waiters: self.queued_waiters,
            in_flight: self.in_flight,
            available_permits: self.available_permits,
        }
    }
}

impl<T> PoolSnapshot<T> {
    /// Get available count
    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// Get in-use count
    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    /// Distinct resources held (available plus in use)
    pub fn size(&self) -> usize {
        self.available.len() + self.in_use.len()
    }

    /// No permit is free
    pub fn is_saturated(&self) -> bool {
        self.available_permits == 0
    }

    pub fn utilization(&self) -> f64 {
        if self.max_concurrent > 0 {
            self.in_use.len() as f64 / self.max_concurrent as f64
        } else {
            0.0
        }
    }

    pub fn is_available(&self, resource: &Arc<T>) -> bool {
        self.available.iter().any(|held| Arc::ptr_eq(held, resource))
    }

    pub fn is_in_use(&self, resource: &Arc<T>) -> bool {
        self.in_use.iter().any(|held| Arc::ptr_eq(held, resource))
    }

    /// Audit this snapshot, see [`validate_rate_limited_pool`]
    pub fn validate(&self) -> ValidationResult {
        validate_rate_limited_pool(self)
    }
}

/// Permits left once `held` are bound to checkouts or in-flight callers
///
/// More holders than permits means the accounting is corrupt. That is
/// logged and reported as zero free permits; the snapshot still carries
/// the raw counts so [`validate_rate_limited_pool`] flags it.
fn remaining_permits(max_concurrent: usize, held: usize) -> usize {
    max_concurrent.checked_sub(held).unwrap_or_else(|| {
        warn!(max_concurrent, held, "more permits held than the pool grants");
        0
    })
}

/// A checked-out resource together with the pool state right after checkout
#[derive(Debug)]
pub struct Acquired<T> {
    pub resource: Arc<T>,
    pub pool: PoolSnapshot<T>,
}

/// Counts a caller as queued until it leaves the semaphore, however it leaves
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PoolInner<T> {
    lifecycle: LifecyclePool<T>,
    /// FIFO: the longest waiter is woken first
    semaphore: Semaphore,
    queued_waiters: AtomicUsize,
    max_concurrent: usize,
    pool_size: usize,
}

/// Pool of reusable resources whose concurrent checkout is bounded by a
/// FIFO semaphore
///
/// Every acquisition first waits for one of `max_concurrent` permits, then
/// takes a resource from a lazily filled [`LifecyclePool`] of at most
/// `pool_size` resources. The permit stays bound to the checkout until
/// [`release`](Self::release).
///
/// Cloning is cheap and yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use esox_ratelimited_pool::{BoxError, FnFactory, RateLimitedPool, RateLimitedPoolOptions};
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// rt.block_on(async {
///     let options = RateLimitedPoolOptions::new(FnFactory::new(|| async {
///         Ok::<_, BoxError>(String::from("connection"))
///     }))
///     .with_max_concurrent(2)
///     .with_pool_size(5);
///     let pool = RateLimitedPool::create(options).await.unwrap();
///
///     let acquired = pool.acquire().await.unwrap();
///     assert_eq!(acquired.pool.available_permits, 1);
///
///     let snapshot = pool.release(&acquired.resource).unwrap();
///     assert_eq!(snapshot.available_permits, 2);
///     assert_eq!(snapshot.available_count(), 1);
/// });
/// ```
pub struct RateLimitedPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for RateLimitedPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> RateLimitedPool<T> {
    /// Create a pool from options
    ///
    /// The limits are checked before anything else is built, so an invalid
    /// configuration never produces a semaphore or lifecycle pool.
    pub async fn create(options: RateLimitedPoolOptions<T>) -> PoolResult<Self> {
        options.validate()?;

        let RateLimitedPoolOptions {
            factory,
            validator,
            max_concurrent,
            pool_size,
        } = options;

        let lifecycle =
            LifecyclePool::create(factory, validator, LifecycleConfig::lazy(pool_size)).await?;

        info!(max_concurrent, pool_size, "rate-limited pool created");

        Ok(Self {
            inner: Arc::new(PoolInner {
                lifecycle,
                semaphore: Semaphore::new(max_concurrent),
                queued_waiters: AtomicUsize::new(0),
                max_concurrent,
                pool_size,
            }),
        })
    }

    /// Check out a resource, waiting for a permit if none is free
    ///
    /// Waiters are served in the order they called `acquire`. If the
    /// factory or validator fails, or the future is dropped before it
    /// completes, the permit goes back to the semaphore.
    pub async fn acquire(&self) -> PoolResult<Acquired<T>> {
        let permit = self.wait_for_permit().await?;
        self.checkout(permit).await
    }

    /// Check out a resource only if a permit is free right now
    pub async fn try_acquire(&self) -> PoolResult<Option<Acquired<T>>> {
        match self.inner.semaphore.try_acquire() {
            Ok(permit) => self.checkout(permit).await.map(Some),
            Err(TryAcquireError::NoPermits) => Ok(None),
            // never closed by the pool
            Err(TryAcquireError::Closed) => Err(PoolError::Cancelled),
        }
    }

    /// [`acquire`](Self::acquire) bounded by a timeout
    ///
    /// On expiry the pending acquisition is dropped, which restores the
    /// waiter count and returns any permit it was granted.
    pub async fn acquire_timeout(&self, timeout: Duration) -> PoolResult<Acquired<T>> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                self.inner
                    .lifecycle
                    .tracker()
                    .timeouts
                    .fetch_add(1, Ordering::Relaxed);
                warn!(?timeout, "timed out waiting for a pooled resource");
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    /// Check out a resource wrapped in a guard that releases it on drop
    pub async fn acquire_guard(&self) -> PoolResult<PooledResource<T>> {
        let Acquired { resource, .. } = self.acquire().await?;
        Ok(PooledResource {
            resource,
            pool: self.clone(),
            released: false,
        })
    }

    async fn wait_for_permit(&self) -> PoolResult<SemaphorePermit<'_>> {
        let _waiting = Waiting::enter(&self.inner.queued_waiters);
        trace!(
            available_permits = self.inner.semaphore.available_permits(),
            "waiting for permit"
        );
        self.inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| PoolError::Cancelled)
    }

    async fn checkout(&self, permit: SemaphorePermit<'_>) -> PoolResult<Acquired<T>> {
        // Dropping `permit` on any early return hands it back to the semaphore.
        let resource = self.inner.lifecycle.acquire().await?;
        permit.forget();
        Ok(Acquired {
            resource,
            pool: self.snapshot(),
        })
    }

    /// Return a checked-out resource and free its permit
    ///
    /// Never suspends. The freed permit goes to the longest-waiting
    /// `acquire`, if any. Releasing a resource that is not checked out
    /// fails with [`PoolError::NotInUse`] and changes nothing.
    pub fn release(&self, resource: &Arc<T>) -> PoolResult<PoolSnapshot<T>> {
        if let Err(err) = self.inner.lifecycle.release(resource) {
            warn!("attempted to release a resource that is not in use");
            return Err(err);
        }
        self.inner.semaphore.add_permits(1);

        let snapshot = self.snapshot();
        debug!(
            in_use = snapshot.in_use_count(),
            available_permits = snapshot.available_permits,
            queued_waiters = snapshot.queued_waiters,
            "resource released"
        );
        Ok(snapshot)
    }

    /// Read the current state
    pub fn snapshot(&self) -> PoolSnapshot<T> {
        let queued_waiters = self.inner.queued_waiters.load(Ordering::SeqCst);
        let max_concurrent = self.inner.max_concurrent;
        self.inner.lifecycle.read(|state| PoolSnapshot {
            available: state.available.iter().cloned().collect(),
            in_use: state.in_use.clone(),
            max_concurrent,
            pool_size: self.inner.pool_size,
            queued_waiters,
            in_flight: state.acquiring,
            available_permits: remaining_permits(
                max_concurrent,
                state.in_use.len() + state.acquiring,
            ),
        })
    }

    /// Get available count
    pub fn available_count(&self) -> usize {
        self.inner.lifecycle.available_count()
    }

    /// Get in-use count
    pub fn in_use_count(&self) -> usize {
        self.inner.lifecycle.in_use_count()
    }

    /// Distinct resources held (available plus in use)
    pub fn size(&self) -> usize {
        self.inner.lifecycle.size()
    }

    pub fn queued_waiters(&self) -> usize {
        self.inner.queued_waiters.load(Ordering::SeqCst)
    }

    pub fn available_permits(&self) -> usize {
        self.snapshot().available_permits
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::from_snapshot(&self.snapshot())
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.lifecycle.tracker().get_metrics(&self.snapshot())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for RateLimitedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("RateLimitedPool")
            .field("available", &snapshot.available_count())
            .field("in_use", &snapshot.in_use_count())
            .field("max_concurrent", &snapshot.max_concurrent)
            .field("pool_size", &snapshot.pool_size)
            .field("queued_waiters", &snapshot.queued_waiters)
            .field("available_permits", &snapshot.available_permits)
            .finish()
    }
}

/// A pooled resource that is released back to its pool when dropped
pub struct PooledResource<T: Send + Sync + 'static> {
    resource: Arc<T>,
    pool: RateLimitedPool<T>,
    released: bool,
}

impl<T: Send + Sync + 'static> PooledResource<T> {
    /// The shared resource, for identity comparisons
    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }

    /// Release now and get the resulting snapshot
    pub fn release(mut self) -> PoolResult<PoolSnapshot<T>> {
        self.released = true;
        self.pool.release(&self.resource)
    }
}

impl<T: Send + Sync + 'static> Deref for PooledResource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<T: Send + Sync + 'static> Drop for PooledResource<T> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.pool.release(&self.resource) {
                warn!(error = %err, "pooled resource could not be returned on drop");
            }
        }
    }
}
