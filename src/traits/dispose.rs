//! Teardown trait for scoped instances.

use crate::error::BoxError;

/// Synchronous teardown for instances cached by an injector.
///
/// Register it on a provider with
/// [`ProviderBuilder::disposable`](crate::ProviderBuilder::disposable). When
/// the owning injector is destroyed, `dispose` runs once per cached
/// instance. Errors and panics are caught per instance and reported; they
/// never stop the remaining teardowns.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{BoxError, Dispose, Provider, Scope, Token};
///
/// struct Transaction {
///     id: u64,
/// }
///
/// impl Dispose for Transaction {
///     fn dispose(&self) -> Result<(), BoxError> {
///         println!("rolling back transaction {}", self.id);
///         Ok(())
///     }
/// }
///
/// let tx = Token::<Transaction>::new("Transaction");
/// let provider = Provider::builder(&tx)
///     .scope(Scope::Operation)
///     .disposable()
///     .factory(|_| Transaction { id: 7 });
/// assert_eq!(provider.scope(), Scope::Operation);
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Release resources held by this instance.
    fn dispose(&self) -> Result<(), BoxError>;
}
