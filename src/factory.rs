//! Resource creation and validation contracts

use crate::errors::BoxError;

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// Creates new resource instances for a pool
///
/// Errors propagate unchanged to the caller of the acquisition that
/// triggered the creation.
#[async_trait]
pub trait ObjectFactory<T>: Send + Sync {
    /// Create a new resource
    async fn create(&self) -> Result<T, BoxError>;
}

/// Checks whether an idle resource is still usable before it is handed out
///
/// A rejected resource is skipped, not destroyed: it stays in the
/// available partition.
#[async_trait]
pub trait ObjectValidator<T>: Send + Sync {
    /// Returns `Ok(true)` if the resource can be reused
    async fn validate(&self, resource: &T) -> Result<bool, BoxError>;
}

/// Adapts an async closure into an [`ObjectFactory`]
///
/// # Examples
///
/// ```
/// use esox_ratelimited_pool::{BoxError, FnFactory, ObjectFactory};
///
/// let factory = FnFactory::new(|| async { Ok::<_, BoxError>(String::from("conn")) });
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// let conn = rt.block_on(factory.create()).unwrap();
/// assert_eq!(conn, "conn");
/// ```
pub struct FnFactory<F> {
    func: F,
}

impl<F> FnFactory<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<T, F, Fut, E> ObjectFactory<T> for FnFactory<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn create(&self) -> Result<T, BoxError> {
        (self.func)().await.map_err(Into::into)
    }
}

/// Adapts a synchronous predicate into an [`ObjectValidator`]
pub struct FnValidator<T, F> {
    func: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> FnValidator<T, F>
where
    F: Fn(&T) -> bool,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> ObjectValidator<T> for FnValidator<T, F>
where
    T: Sync + 'static,
    F: Fn(&T) -> bool + Send + Sync,
{
    async fn validate(&self, resource: &T) -> Result<bool, BoxError> {
        Ok((self.func)(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_factory_creates() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory = {
            let counter = Arc::clone(&counter);
            FnFactory::new(move || {
                let id = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, BoxError>(id) }
            })
        };

        assert_eq!(factory.create().await.unwrap(), 0);
        assert_eq!(factory.create().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fn_factory_propagates_error() {
        let factory = FnFactory::new(|| async { Err::<u32, _>("refused") });

        let err = ObjectFactory::<u32>::create(&factory).await.unwrap_err();
        assert_eq!(err.to_string(), "refused");
    }

    #[tokio::test]
    async fn test_fn_validator() {
        let validator = FnValidator::new(|value: &i32| *value > 0);

        assert!(validator.validate(&1).await.unwrap());
        assert!(!validator.validate(&-1).await.unwrap());
    }
}
