//! Async factory support.
//!
//! Factories that perform I/O (opening a connection pool, fetching a
//! session record) implement [`AsyncFactory`]. Concurrent requesters of the
//! same token await a single in-flight construction.

use async_trait::async_trait;

use crate::error::BoxError;
use crate::provider::ProviderContext;

/// Trait for factories that create instances asynchronously.
///
/// Implemented for any `Fn(&ProviderContext) -> impl Future` closure. Read
/// what you need from the context before the `async` block, since the
/// returned future cannot borrow it.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{AsyncFactory, BoxError, Provider, ProviderContext, Scope, Token};
/// use async_trait::async_trait;
///
/// struct Pool { size: usize }
///
/// struct PoolFactory { size: usize }
///
/// #[async_trait]
/// impl AsyncFactory<Pool> for PoolFactory {
///     async fn create(&self, _ctx: &ProviderContext) -> Result<Pool, BoxError> {
///         tokio::time::sleep(std::time::Duration::from_millis(1)).await;
///         Ok(Pool { size: self.size })
///     }
/// }
///
/// let pool = Token::<Pool>::new("Pool");
/// let provider = Provider::builder(&pool)
///     .global()
///     .async_factory(PoolFactory { size: 8 });
/// assert!(provider.is_global());
///
/// // Closures work too
/// let session_pool = Token::<Pool>::new("SessionPool");
/// let provider = Provider::builder(&session_pool)
///     .scope(Scope::Session)
///     .async_factory(|_ctx: &ProviderContext| async { Ok::<_, BoxError>(Pool { size: 1 }) });
/// assert_eq!(provider.scope(), Scope::Session);
/// ```
#[async_trait]
pub trait AsyncFactory<T: Send + Sync + 'static>: Send + Sync {
    /// Creates a new instance from the resolved dependencies in `ctx`.
    async fn create(&self, ctx: &ProviderContext) -> Result<T, BoxError>;
}

#[async_trait]
impl<T, F, Fut> AsyncFactory<T> for F
where
    T: Send + Sync + 'static,
    F: Fn(&ProviderContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T, BoxError>> + Send,
{
    async fn create(&self, ctx: &ProviderContext) -> Result<T, BoxError> {
        self(ctx).await
    }
}
