//! Object lifecycle pool: creation, validation and available/in-use tracking

use crate::config::LifecycleConfig;
use crate::errors::{PoolError, PoolResult};
use crate::factory::{ObjectFactory, ObjectValidator};
use crate::metrics::MetricsTracker;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Partitions and in-flight counters, always mutated under one lock
pub(crate) struct LifecycleState<T> {
    /// Most recently released first
    pub available: VecDeque<Arc<T>>,
    pub in_use: Vec<Arc<T>>,
    /// Callers currently inside `acquire`
    pub acquiring: usize,
    /// Creation slots reserved against `max_size`
    pub creating: usize,
}

impl<T> LifecycleState<T> {
    fn new() -> Self {
        Self {
            available: VecDeque::new(),
            in_use: Vec::new(),
            acquiring: 0,
            creating: 0,
        }
    }

    fn total(&self) -> usize {
        self.available.len() + self.in_use.len() + self.creating
    }
}

/// Rolls back in-flight counters if an acquisition does not complete
struct InFlight<'a, T> {
    state: &'a Mutex<LifecycleState<T>>,
    acquiring: bool,
    creating: bool,
}

impl<'a, T> InFlight<'a, T> {
    fn enter(state: &'a Mutex<LifecycleState<T>>) -> Self {
        state.lock().acquiring += 1;
        Self {
            state,
            acquiring: true,
            creating: false,
        }
    }

    fn settle(&mut self, state: &mut LifecycleState<T>) {
        if self.acquiring {
            state.acquiring -= 1;
            self.acquiring = false;
        }
        if self.creating {
            state.creating -= 1;
            self.creating = false;
        }
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if self.acquiring || self.creating {
            let state = self.state;
            let mut guard = state.lock();
            self.settle(&mut guard);
        }
    }
}

/// Pool of lazily created resources bounded by `max_size`
///
/// Tracks which resources are available and which are checked out. It does
/// not limit how many callers acquire at once; that is the job of
/// [`RateLimitedPool`](crate::RateLimitedPool).
pub struct LifecyclePool<T> {
    factory: Arc<dyn ObjectFactory<T>>,
    validator: Option<Arc<dyn ObjectValidator<T>>>,
    config: LifecycleConfig,
    state: Mutex<LifecycleState<T>>,
    metrics: Arc<MetricsTracker>,
}

impl<T: Send + Sync + 'static> LifecyclePool<T> {
    /// Create a pool, seeding `min_size` resources through the factory
    pub async fn create(
        factory: Arc<dyn ObjectFactory<T>>,
        validator: Option<Arc<dyn ObjectValidator<T>>>,
        config: LifecycleConfig,
    ) -> PoolResult<Self> {
        config.validate()?;

        let pool = Self {
            factory,
            validator,
            config,
            state: Mutex::new(LifecycleState::new()),
            metrics: Arc::new(MetricsTracker::new()),
        };
        pool.warmup(config.min_size).await?;
        Ok(pool)
    }

    async fn warmup(&self, count: usize) -> PoolResult<()> {
        for _ in 0..count.min(self.config.max_size) {
            let resource = self.factory.create().await.map_err(|err| {
                self.metrics.factory_failures.fetch_add(1, Ordering::Relaxed);
                PoolError::factory(err)
            })?;
            self.metrics.resources_created.fetch_add(1, Ordering::Relaxed);
            self.state.lock().available.push_back(Arc::new(resource));
        }
        if count > 0 {
            debug!(count, "lifecycle pool warmed up");
        }
        Ok(())
    }

    /// Check out a resource, reusing a valid idle one or creating a new one
    ///
    /// Idle resources rejected by the validator are skipped and left in
    /// place. Fails with [`PoolError::PoolExhausted`] if nothing valid is
    /// idle and the pool already holds `max_size` resources.
    pub async fn acquire(&self) -> PoolResult<Arc<T>> {
        let mut in_flight = InFlight::enter(&self.state);

        if let Some(resource) = self.reuse(&mut in_flight).await? {
            return Ok(resource);
        }

        {
            let mut state = self.state.lock();
            if state.total() >= self.config.max_size {
                error!(
                    available = state.available.len(),
                    in_use = state.in_use.len(),
                    max_size = self.config.max_size,
                    "no valid resource available and pool is at capacity"
                );
                return Err(PoolError::PoolExhausted);
            }
            state.creating += 1;
            in_flight.creating = true;
        }

        let resource = match self.factory.create().await {
            Ok(value) => Arc::new(value),
            Err(err) => {
                self.metrics.factory_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "resource factory failed");
                return Err(PoolError::factory(err));
            }
        };

        let mut state = self.state.lock();
        in_flight.settle(&mut state);
        state.in_use.push(Arc::clone(&resource));
        self.metrics.resources_created.fetch_add(1, Ordering::Relaxed);
        self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
        debug!(total = state.total(), "created new resource");
        Ok(resource)
    }

    async fn reuse(&self, in_flight: &mut InFlight<'_, T>) -> PoolResult<Option<Arc<T>>> {
        let Some(validator) = &self.validator else {
            let mut state = self.state.lock();
            return Ok(state.available.pop_front().map(|resource| {
                in_flight.settle(&mut state);
                state.in_use.push(Arc::clone(&resource));
                self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                resource
            }));
        };

        let candidates: Vec<Arc<T>> = self.state.lock().available.iter().cloned().collect();
        for candidate in candidates {
            let valid = validator
                .validate(&candidate)
                .await
                .map_err(PoolError::validator)?;
            if !valid {
                self.metrics.validation_rejections.fetch_add(1, Ordering::Relaxed);
                debug!("idle resource failed validation, skipping");
                continue;
            }

            let mut state = self.state.lock();
            // Another caller may have taken it while we were validating.
            let Some(pos) = state
                .available
                .iter()
                .position(|resource| Arc::ptr_eq(resource, &candidate))
            else {
                continue;
            };
            state.available.remove(pos);
            in_flight.settle(&mut state);
            state.in_use.push(Arc::clone(&candidate));
            self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(candidate));
        }
        Ok(None)
    }

    /// Return a checked-out resource to the available partition
    ///
    /// Fails with [`PoolError::NotInUse`], leaving state untouched, if the
    /// resource is not currently checked out from this pool.
    pub fn release(&self, resource: &Arc<T>) -> PoolResult<()> {
        let mut state = self.state.lock();
        let Some(pos) = state
            .in_use
            .iter()
            .position(|held| Arc::ptr_eq(held, resource))
        else {
            self.metrics.release_errors.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::NotInUse);
        };
        let resource = state.in_use.remove(pos);
        state.available.push_front(resource);
        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Get available count
    pub fn available_count(&self) -> usize {
        self.state.lock().available.len()
    }

    /// Get in-use count
    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// Distinct resources currently held (available plus in use)
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        state.available.len() + state.in_use.len()
    }

    pub fn config(&self) -> LifecycleConfig {
        self.config
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&LifecycleState<T>) -> R) -> R {
        f(&self.state.lock())
    }

    pub(crate) fn tracker(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BoxError, ValidationError};
    use crate::factory::{FnFactory, FnValidator};
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct Conn {
        id: usize,
        healthy: AtomicBool,
    }

    fn counting_factory(counter: Arc<AtomicUsize>) -> Arc<dyn ObjectFactory<Conn>> {
        Arc::new(FnFactory::new(move || {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, BoxError>(Conn {
                    id,
                    healthy: AtomicBool::new(true),
                })
            }
        }))
    }

    fn health_validator() -> Option<Arc<dyn ObjectValidator<Conn>>> {
        Some(Arc::new(FnValidator::new(|conn: &Conn| {
            conn.healthy.load(Ordering::SeqCst)
        })))
    }

    #[tokio::test]
    async fn test_creates_lazily() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = LifecyclePool::create(
            counting_factory(Arc::clone(&created)),
            None,
            LifecycleConfig::lazy(3),
        )
        .await
        .unwrap();

        assert_eq!(pool.size(), 0);
        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id, 0);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_use_count(), 1);
    }

    #[tokio::test]
    async fn test_warmup_seeds_min_size() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = LifecyclePool::create(
            counting_factory(Arc::clone(&created)),
            None,
            LifecycleConfig::new(2, 4),
        )
        .await
        .unwrap();

        assert_eq!(pool.available_count(), 2);
        let _conn = pool.acquire().await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let result = LifecyclePool::create(
            counting_factory(Arc::new(AtomicUsize::new(0))),
            None,
            LifecycleConfig::new(3, 2),
        )
        .await;

        assert!(matches!(
            result,
            Err(PoolError::InvalidConfiguration(ValidationError::MinExceedsMaxSize { .. }))
        ));
    }

    #[tokio::test]
    async fn test_release_makes_resource_reusable() {
        let pool = LifecyclePool::create(
            counting_factory(Arc::new(AtomicUsize::new(0))),
            None,
            LifecycleConfig::lazy(2),
        )
        .await
        .unwrap();

        let first = pool.acquire().await.unwrap();
        pool.release(&first).unwrap();
        let again = pool.acquire().await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn test_release_unknown_resource() {
        let pool = LifecyclePool::create(
            counting_factory(Arc::new(AtomicUsize::new(0))),
            None,
            LifecycleConfig::lazy(2),
        )
        .await
        .unwrap();

        let foreign = Arc::new(Conn {
            id: 99,
            healthy: AtomicBool::new(true),
        });
        assert!(matches!(pool.release(&foreign), Err(PoolError::NotInUse)));
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn test_invalid_resource_is_skipped_and_retained() {
        let pool = LifecyclePool::create(
            counting_factory(Arc::new(AtomicUsize::new(0))),
            health_validator(),
            LifecycleConfig::lazy(2),
        )
        .await
        .unwrap();

        let stale = pool.acquire().await.unwrap();
        stale.healthy.store(false, Ordering::SeqCst);
        pool.release(&stale).unwrap();

        let fresh = pool.acquire().await.unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(pool.available_count(), 1);
        assert_eq!(pool.tracker().validation_rejections.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_exhausted_when_full_of_invalid_resources() {
        let pool = LifecyclePool::create(
            counting_factory(Arc::new(AtomicUsize::new(0))),
            health_validator(),
            LifecycleConfig::lazy(1),
        )
        .await
        .unwrap();

        let only = pool.acquire().await.unwrap();
        only.healthy.store(false, Ordering::SeqCst);
        pool.release(&only).unwrap();

        assert!(matches!(pool.acquire().await, Err(PoolError::PoolExhausted)));
        pool.read(|state| {
            assert_eq!(state.acquiring, 0);
            assert_eq!(state.creating, 0);
        });
    }

    #[tokio::test]
    async fn test_factory_failure_releases_creation_slot() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let factory: Arc<dyn ObjectFactory<usize>> = {
            let attempts = Arc::clone(&attempts);
            Arc::new(FnFactory::new(move || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err::<usize, BoxError>("connection refused".into())
                    } else {
                        Ok(attempt)
                    }
                }
            }))
        };
        let pool = LifecyclePool::create(factory, None, LifecycleConfig::lazy(1))
            .await
            .unwrap();

        assert!(matches!(pool.acquire().await, Err(PoolError::Factory(_))));
        pool.read(|state| assert_eq!(state.total(), 0));

        let resource = pool.acquire().await.unwrap();
        assert_eq!(*resource, 1);
    }
}
