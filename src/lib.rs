//! # EsoxSolutions.RateLimitedPool
//!
//! Async resource pool whose concurrent checkouts are throttled by a FIFO
//! counting semaphore, layered over a lazily filled object lifecycle pool.
//!
//! ## Features
//!
//! - Concurrency limit (`max_concurrent`) separate from pool capacity (`pool_size`)
//! - Strict FIFO wake-up order among waiting callers
//! - Lazy resource creation through an async factory
//! - Optional validation of idle resources before reuse
//! - Permits are never leaked on factory failure, timeout or cancellation
//! - Immutable snapshots of pool state after every operation
//! - RAII guards that release on drop
//! - Consistency auditing, health status and Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_ratelimited_pool::{BoxError, FnFactory, RateLimitedPool, RateLimitedPoolOptions};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let factory = FnFactory::new(|| async { Ok::<_, BoxError>(42) });
//!     let options = RateLimitedPoolOptions::new(factory)
//!         .with_max_concurrent(2)
//!         .with_pool_size(4);
//!     let pool = RateLimitedPool::create(options).await.unwrap();
//!
//!     {
//!         let conn = pool.acquire_guard().await.unwrap();
//!         println!("Got: {}", *conn);
//!         // Resource automatically released when `conn` goes out of scope
//!     }
//!     assert_eq!(pool.available_count(), 1);
//! });
//! ```

mod config;
mod errors;
mod factory;
mod health;
mod lifecycle;
mod metrics;
mod pool;
mod validation;

pub use config::{
    LifecycleConfig, RateLimitedPoolOptions, DEFAULT_MAX_CONCURRENT, DEFAULT_POOL_SIZE,
};
pub use errors::{BoxError, PoolError, PoolResult, SharedError, ValidationError};
pub use factory::{FnFactory, FnValidator, ObjectFactory, ObjectValidator};
pub use health::HealthStatus;
pub use lifecycle::LifecyclePool;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{Acquired, PoolSnapshot, PooledResource, RateLimitedPool};
pub use validation::{validate_rate_limited_pool, ValidationResult};
