// EsoxSolutions.RateLimitedPool
// Async resource pool throttled by a FIFO semaphore

// This is just a binary wrapper - the actual library is in lib.rs

use esox_ratelimited_pool::{
    BoxError, FnFactory, PoolResult, RateLimitedPool, RateLimitedPoolOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> PoolResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== EsoxSolutions.RateLimitedPool ===");
    println!();

    let next_id = Arc::new(AtomicUsize::new(1));
    let options = RateLimitedPoolOptions::new(FnFactory::new(move || {
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        async move { Ok::<_, BoxError>(format!("connection-{id}")) }
    }))
    .with_max_concurrent(2)
    .with_pool_size(4);

    let pool = RateLimitedPool::create(options).await?;

    let mut handles = Vec::new();
    for task in 0..6 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire_guard().await?;
            println!("  Task {task} got {}", *conn);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, esox_ratelimited_pool::PoolError>(())
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(result) => result?,
            Err(err) => eprintln!("  Task failed: {err}"),
        }
    }

    let snapshot = pool.snapshot();
    println!();
    println!("  Resources created: {}", pool.metrics().resources_created);
    println!("  Available after return: {}", snapshot.available_count());
    println!("  Free permits: {}", snapshot.available_permits);

    Ok(())
}
