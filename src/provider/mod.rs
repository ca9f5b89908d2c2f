//! Provider definitions: construction recipes bound to a token and scope.
//!
//! A [`Provider`] is built once with [`Provider::builder`] and then
//! registered on a [`Module`](crate::Module). Registration never constructs
//! anything; instances are created lazily by injectors (or eagerly at boot
//! for application-scoped providers, depending on
//! [`InstantiationPolicy`](crate::InstantiationPolicy)).

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, DiError, DiResult};
use crate::scope::Scope;
use crate::token::{AnyToken, Token};
use crate::traits::Dispose;

pub mod context;
pub mod factory;

pub use context::ProviderContext;
pub use factory::AsyncFactory;

/// Type-erased instance storage.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased construction recipe.
pub(crate) type ErasedFactory =
    Arc<dyn for<'a> Fn(&'a ProviderContext) -> BoxFuture<'a, DiResult<AnyArc>> + Send + Sync>;

/// Type-erased teardown hook.
pub(crate) type ErasedTeardown = Arc<dyn Fn(&AnyArc) -> Result<(), BoxError> + Send + Sync>;

fn erase_factory<F>(f: F) -> ErasedFactory
where
    F: for<'a> Fn(&'a ProviderContext) -> BoxFuture<'a, DiResult<AnyArc>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A construction recipe: token, scope, factory and declared dependencies.
///
/// Cloning a provider keeps the same recipe, which is what makes
/// re-exporting it from another module idempotent. Building a second
/// provider for the same token, even from an identical closure, creates a
/// different recipe.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{Provider, Scope, Token};
///
/// struct RequestId(u64);
///
/// let request_id = Token::<RequestId>::new("RequestId");
/// let provider = Provider::builder(&request_id)
///     .scope(Scope::Operation)
///     .factory(|_| RequestId(1));
///
/// assert!(provider.same_recipe(&provider.clone()));
///
/// let other = Provider::builder(&request_id)
///     .scope(Scope::Operation)
///     .factory(|_| RequestId(1));
/// assert!(!provider.same_recipe(&other));
/// ```
#[derive(Clone)]
pub struct Provider {
    pub(crate) token: AnyToken,
    pub(crate) scope: Scope,
    pub(crate) factory: ErasedFactory,
    pub(crate) dependencies: Vec<AnyToken>,
    pub(crate) global: bool,
    pub(crate) teardown: Option<ErasedTeardown>,
}

impl Provider {
    /// Starts a provider definition for `token`. Defaults to application scope.
    pub fn builder<T: Send + Sync + 'static>(token: &Token<T>) -> ProviderBuilder<T> {
        ProviderBuilder {
            token: token.clone(),
            scope: Scope::Application,
            dependencies: Vec::new(),
            global: false,
            teardown: None,
        }
    }

    /// Token this provider produces.
    pub fn token(&self) -> &AnyToken {
        &self.token
    }

    /// Scope the instance is cached in.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Declared dependencies in resolution order.
    pub fn dependencies(&self) -> &[AnyToken] {
        &self.dependencies
    }

    /// Whether the provider is visible to every module without an import.
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Whether cached instances get a teardown hook.
    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    /// True if both providers share the same factory, scope, dependencies
    /// and global flag.
    pub fn same_recipe(&self, other: &Provider) -> bool {
        self.token == other.token
            && Arc::ptr_eq(&self.factory, &other.factory)
            && self.scope == other.scope
            && self.dependencies == other.dependencies
            && self.global == other.global
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("global", &self.global)
            .finish()
    }
}

/// Fluent builder for [`Provider`].
///
/// Finish with [`value`](Self::value), [`factory`](Self::factory),
/// [`try_factory`](Self::try_factory) or
/// [`async_factory`](Self::async_factory).
pub struct ProviderBuilder<T> {
    token: Token<T>,
    scope: Scope,
    dependencies: Vec<AnyToken>,
    global: bool,
    teardown: Option<ErasedTeardown>,
}

impl<T: Send + Sync + 'static> ProviderBuilder<T> {
    /// Sets the caching scope.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Declares a dependency, resolved before the factory runs.
    pub fn depends_on<D>(mut self, token: &Token<D>) -> Self {
        self.dependencies.push(token.erased().clone());
        self
    }

    /// Marks the provider global: merged at graph assembly and visible to
    /// every module without an explicit import.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Registers a teardown hook run when the caching injector is destroyed.
    pub fn on_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = self.token.name();
        self.teardown = Some(Arc::new(move |instance: &AnyArc| match instance.downcast_ref::<T>() {
            Some(value) => hook(value),
            None => Err(DiError::TypeMismatch(name).into()),
        }));
        self
    }

    /// Uses the [`Dispose`] implementation of `T` as teardown hook.
    pub fn disposable(self) -> Self
    where
        T: Dispose,
    {
        self.on_destroy(|instance: &T| instance.dispose())
    }

    /// Provides a copy of a fixed value.
    ///
    /// Each construction clones `value`, so every injector of the provider's
    /// scope owns its own instance and teardown hooks run once per copy.
    /// Wrap the value in an `Arc` to share one object across sessions.
    pub fn value(self, value: T) -> Provider
    where
        T: Clone,
    {
        let factory = erase_factory(move |_ctx| {
            let instance: AnyArc = Arc::new(value.clone());
            Box::pin(async move { Ok(instance) })
        });
        self.finish(factory)
    }

    /// Provides instances from an infallible synchronous factory.
    pub fn factory<F>(self, factory: F) -> Provider
    where
        F: Fn(&ProviderContext) -> T + Send + Sync + 'static,
    {
        let factory = erase_factory(move |ctx| {
            let instance: AnyArc = Arc::new(factory(ctx));
            Box::pin(async move { Ok(instance) })
        });
        self.finish(factory)
    }

    /// Provides instances from a fallible synchronous factory.
    pub fn try_factory<F, E>(self, factory: F) -> Provider
    where
        F: Fn(&ProviderContext) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let name = self.token.name();
        let factory = erase_factory(move |ctx| {
            let result = factory(ctx)
                .map(|instance| Arc::new(instance) as AnyArc)
                .map_err(|err| DiError::factory_failed(name, err.into()));
            Box::pin(async move { result })
        });
        self.finish(factory)
    }

    /// Provides instances from an [`AsyncFactory`].
    pub fn async_factory<F>(self, factory: F) -> Provider
    where
        F: AsyncFactory<T> + 'static,
    {
        let name = self.token.name();
        let factory = Arc::new(factory);
        let erased = erase_factory(move |ctx| {
            let factory = factory.clone();
            Box::pin(async move {
                factory
                    .create(ctx)
                    .await
                    .map(|instance| Arc::new(instance) as AnyArc)
                    .map_err(|err| DiError::factory_failed(name, err))
            })
        });
        self.finish(erased)
    }

    fn finish(self, factory: ErasedFactory) -> Provider {
        Provider {
            token: self.token.erased().clone(),
            scope: self.scope,
            factory,
            dependencies: self.dependencies,
            global: self.global,
            teardown: self.teardown,
        }
    }
}
