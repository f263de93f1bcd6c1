//! Pool configuration options

use crate::errors::ValidationError;
use crate::factory::{ObjectFactory, ObjectValidator};

use std::fmt;
use std::sync::Arc;

/// Default number of permits when none is configured
pub const DEFAULT_MAX_CONCURRENT: usize = 1;

/// Default number of distinct resources a pool may hold
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Configuration for a rate-limited pool
///
/// These four fields drive all pool behavior.
///
/// # Examples
///
/// ```
/// use esox_ratelimited_pool::{BoxError, FnFactory, RateLimitedPoolOptions};
///
/// let options = RateLimitedPoolOptions::new(FnFactory::new(|| async { Ok::<_, BoxError>(0u32) }))
///     .with_max_concurrent(2)
///     .with_pool_size(5);
///
/// assert_eq!(options.max_concurrent, 2);
/// assert_eq!(options.pool_size, 5);
/// assert!(options.validate().is_ok());
/// ```
pub struct RateLimitedPoolOptions<T> {
    /// Creates new resources on demand
    pub factory: Arc<dyn ObjectFactory<T>>,

    /// Optional check run on idle resources before reuse
    pub validator: Option<Arc<dyn ObjectValidator<T>>>,

    /// Maximum number of resources checked out at once
    pub max_concurrent: usize,

    /// Maximum number of distinct resources held by the pool
    pub pool_size: usize,
}

impl<T> RateLimitedPoolOptions<T> {
    /// Create options around a factory with default limits
    pub fn new<F>(factory: F) -> Self
    where
        F: ObjectFactory<T> + 'static,
    {
        Self::from_shared(Arc::new(factory))
    }

    /// Create options around a factory that is already shared
    pub fn from_shared(factory: Arc<dyn ObjectFactory<T>>) -> Self {
        Self {
            factory,
            validator: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Set the maximum number of concurrent checkouts
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set the maximum number of distinct resources
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Validate idle resources before handing them out
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: ObjectValidator<T> + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Check the limits, reporting the first violation found
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent == 0 {
            return Err(ValidationError::InvalidConcurrentLimit(self.max_concurrent));
        }
        if self.pool_size == 0 {
            return Err(ValidationError::InvalidPoolSize(self.pool_size));
        }
        if self.max_concurrent > self.pool_size {
            return Err(ValidationError::ConcurrentExceedsPoolSize {
                max_concurrent: self.max_concurrent,
                pool_size: self.pool_size,
            });
        }
        Ok(())
    }
}

impl<T> Clone for RateLimitedPoolOptions<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            validator: self.validator.clone(),
            max_concurrent: self.max_concurrent,
            pool_size: self.pool_size,
        }
    }
}

impl<T> fmt::Debug for RateLimitedPoolOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedPoolOptions")
            .field("has_validator", &self.validator.is_some())
            .field("max_concurrent", &self.max_concurrent)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Size bounds for a lifecycle pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Resources created up front
    pub min_size: usize,

    /// Upper bound on distinct resources
    pub max_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl LifecycleConfig {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self { min_size, max_size }
    }

    /// Lazy-only configuration: nothing is created until demanded
    pub fn lazy(max_size: usize) -> Self {
        Self::new(0, max_size)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidPoolSize(self.max_size));
        }
        if self.min_size > self.max_size {
            return Err(ValidationError::MinExceedsMaxSize {
                min_size: self.min_size,
                max_size: self.max_size,
            });
        }
        Ok(())
    }
}
