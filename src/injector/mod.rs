//! Scoped injectors.
//!
//! An application owns one root injector (application scope). Each session
//! gets a child injector, and each operation a grandchild. A provider is
//! always constructed and cached by the injector whose level matches its
//! scope; narrower injectors delegate broader-scoped requests upward and
//! never cache those instances themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::config::ApplicationConfig;
use crate::error::{DiError, DiResult, TeardownError};
use crate::execution::SessionValue;
use crate::graph::ModuleGraph;
use crate::hooks::{Hooks, InjectorInfo, SpanGuard};
use crate::internal::teardown::run_one;
use crate::internal::{ResolutionPath, TeardownBag};
use crate::module::ModuleId;
use crate::provider::{AnyArc, BoxFuture, ProviderContext};
use crate::scope::Scope;
use crate::token::{AnyToken, Token, MODULE_ID, SESSION};

mod view;

pub use view::ModuleInjector;

static NEXT_INJECTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique injector identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjectorId(u64);

impl InjectorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_INJECTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Lifecycle state of an injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorState {
    /// Built but not yet handed to a caller
    Created,
    /// Serving resolutions
    Active,
    /// Torn down; every resolution fails with `InjectorDestroyed`
    Destroyed,
}

/// State shared by every injector of one application.
pub(crate) struct Runtime {
    pub(crate) graph: Arc<ModuleGraph>,
    pub(crate) hooks: Hooks,
    pub(crate) config: ApplicationConfig,
}

type Slot = Arc<OnceCell<AnyArc>>;

struct Lifecycle {
    state: InjectorState,
    teardown: TeardownBag,
    span: Option<SpanGuard>,
}

struct InjectorInner {
    id: InjectorId,
    scope: Scope,
    parent: Option<Injector>,
    runtime: Arc<Runtime>,
    session: Option<SessionValue>,
    slots: Mutex<HashMap<usize, Slot>>,
    lifecycle: Mutex<Lifecycle>,
}

/// A scoped container resolving tokens to cached instances.
///
/// Cloning is cheap and shares the same cache. Requests through an
/// `Injector` see global providers only; use a [`ModuleInjector`] (for
/// example from [`OperationContext::injector`](crate::OperationContext::injector))
/// to resolve with a module's visibility.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

impl Injector {
    pub(crate) fn root(runtime: Arc<Runtime>) -> Self {
        Self::create(Scope::Application, None, runtime, None)
    }

    /// Creates a session injector below this application injector.
    pub(crate) fn session_child(&self, session: SessionValue) -> DiResult<Self> {
        debug_assert_eq!(self.inner.scope, Scope::Application);
        self.ensure_live()?;
        Ok(Self::create(
            Scope::Session,
            Some(self.clone()),
            self.inner.runtime.clone(),
            Some(session),
        ))
    }

    /// Creates an operation injector below this session injector.
    pub(crate) fn operation_child(&self) -> DiResult<Self> {
        debug_assert_eq!(self.inner.scope, Scope::Session);
        self.ensure_live()?;
        Ok(Self::create(
            Scope::Operation,
            Some(self.clone()),
            self.inner.runtime.clone(),
            self.inner.session.clone(),
        ))
    }

    fn create(scope: Scope, parent: Option<Injector>, runtime: Arc<Runtime>, session: Option<SessionValue>) -> Self {
        let id = InjectorId::next();
        let info = InjectorInfo {
            id,
            scope,
            parent: parent.as_ref().map(Injector::id),
        };
        let span = runtime.hooks.injector(&info);
        tracing::trace!(injector = id.get(), scope = %scope, "injector created");
        Self {
            inner: Arc::new(InjectorInner {
                id,
                scope,
                parent,
                runtime,
                session,
                slots: Mutex::new(HashMap::new()),
                lifecycle: Mutex::new(Lifecycle {
                    state: InjectorState::Created,
                    teardown: TeardownBag::default(),
                    span: Some(span),
                }),
            }),
        }
    }

    pub fn id(&self) -> InjectorId {
        self.inner.id
    }

    pub fn scope(&self) -> Scope {
        self.inner.scope
    }

    pub fn parent(&self) -> Option<&Injector> {
        self.inner.parent.as_ref()
    }

    pub fn state(&self) -> InjectorState {
        self.inner.lifecycle.lock().state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == InjectorState::Destroyed
    }

    /// The module graph this injector resolves against.
    pub fn graph(&self) -> &Arc<ModuleGraph> {
        &self.inner.runtime.graph
    }

    /// Binds this injector to the visibility of module `id`.
    pub fn for_module(&self, id: &ModuleId) -> Option<ModuleInjector> {
        let module = self.inner.runtime.graph.module_index(id)?;
        Some(ModuleInjector::new(self.clone(), module, id.clone()))
    }

    /// Resolves `token` among global providers.
    pub async fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> DiResult<Arc<T>> {
        let any = self.resolve_any(None, token.erased(), ResolutionPath::new()).await?;
        downcast(any, token)
    }

    /// Whether this injector itself caches an instance for `token`.
    ///
    /// Instances delegated to an ancestor are reported by that ancestor only.
    pub fn is_cached<T>(&self, token: &Token<T>) -> bool {
        let Some(idx) = self.inner.runtime.graph.provider_index(token.erased()) else {
            return false;
        };
        self.inner
            .slots
            .lock()
            .get(&idx)
            .is_some_and(|slot| slot.initialized())
    }

    pub(crate) fn activate(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state == InjectorState::Created {
            lifecycle.state = InjectorState::Active;
        }
    }

    /// Destroys this injector and tears down every instance it cached.
    ///
    /// Teardown hooks run in reverse construction order. Failures are
    /// reported to the lifecycle hooks and returned; they never stop the
    /// remaining hooks. Calling `destroy` again is a no-op returning no
    /// failures.
    pub fn destroy(&self) -> Vec<TeardownError> {
        self.inner.destroy()
    }

    fn ensure_live(&self) -> DiResult<()> {
        if self.inner.lifecycle.lock().state == InjectorState::Destroyed {
            return Err(DiError::InjectorDestroyed { scope: self.inner.scope });
        }
        Ok(())
    }

    fn not_found(&self, token: &AnyToken) -> DiError {
        DiError::ProviderNotFound {
            token: token.name(),
            scope: self.inner.scope,
        }
    }

    /// Walks up to the injector of `scope`.
    fn ancestor(&self, scope: Scope) -> Option<&Injector> {
        let mut current = self;
        while current.inner.scope != scope {
            current = current.inner.parent.as_ref()?;
        }
        Some(current)
    }

    /// Resolves `token` from the view of module `view` (`None` for globals only).
    pub(crate) fn resolve_any<'a>(
        &'a self,
        view: Option<usize>,
        token: &'a AnyToken,
        path: ResolutionPath,
    ) -> BoxFuture<'a, DiResult<AnyArc>> {
        Box::pin(async move {
            self.ensure_live()?;
            let graph = &self.inner.runtime.graph;

            if token == MODULE_ID.erased() {
                return match view {
                    Some(pos) => Ok(Arc::new(graph.module_at(pos).id().clone()) as AnyArc),
                    None => Err(self.not_found(token)),
                };
            }
            if token == SESSION.erased() {
                return match &self.inner.session {
                    Some(session) => Ok(Arc::new(session.clone()) as AnyArc),
                    None => Err(self.not_found(token)),
                };
            }

            let idx = graph.lookup(view, token).ok_or_else(|| self.not_found(token))?;
            let scope = graph.provider_at(idx).provider.scope;
            let owner = self.ancestor(scope).ok_or_else(|| self.not_found(token))?;
            let path = path.enter(token, self.inner.runtime.config.max_resolution_depth)?;
            owner.instantiate(idx, path).await
        })
    }

    /// Returns the cached instance of provider `idx`, constructing it at most once.
    pub(crate) async fn instantiate(&self, idx: usize, path: ResolutionPath) -> DiResult<AnyArc> {
        self.ensure_live()?;
        let slot = self.inner.slots.lock().entry(idx).or_default().clone();
        let instance = slot.get_or_try_init(|| self.construct(idx, path)).await?.clone();
        // destroyed while waiting on another caller's construction
        self.ensure_live()?;
        Ok(instance)
    }

    async fn construct(&self, idx: usize, path: ResolutionPath) -> DiResult<AnyArc> {
        let graph = self.inner.runtime.graph.clone();
        let entry = graph.provider_at(idx);
        let provider = &entry.provider;
        let name = provider.token.name();

        let mut dependencies = Vec::with_capacity(provider.dependencies.len());
        for dependency in &provider.dependencies {
            let value = self.resolve_any(Some(entry.owner), dependency, path.clone()).await?;
            dependencies.push((dependency.clone(), value));
        }

        let ctx = ProviderContext::new(name, graph.module_at(entry.owner).id().clone(), self.inner.scope, dependencies);
        let instance = (provider.factory)(&ctx).await?;

        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state == InjectorState::Destroyed {
            drop(lifecycle);
            tracing::debug!(token = name, scope = %self.inner.scope, "discarding instance built during destroy");
            if let Some(hook) = &provider.teardown {
                if let Some(err) = run_one(self.inner.scope, name, &instance, hook) {
                    self.inner.report_teardown_error(&err);
                }
            }
            return Err(DiError::InjectorDestroyed { scope: self.inner.scope });
        }
        if let Some(hook) = &provider.teardown {
            lifecycle.teardown.push(name, instance.clone(), hook.clone());
        }
        drop(lifecycle);

        tracing::trace!(token = name, scope = %self.inner.scope, injector = self.inner.id.get(), "instance constructed");
        Ok(instance)
    }
}

impl InjectorInner {
    fn info(&self) -> InjectorInfo {
        InjectorInfo {
            id: self.id,
            scope: self.scope,
            parent: self.parent.as_ref().map(Injector::id),
        }
    }

    fn report_teardown_error(&self, err: &TeardownError) {
        tracing::warn!(injector = self.id.get(), scope = %self.scope, token = err.token, "teardown failed: {}", err.message);
        self.runtime.hooks.teardown_error(&self.info(), err);
    }

    fn destroy(&self) -> Vec<TeardownError> {
        let (bag, lifetime_span) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == InjectorState::Destroyed {
                return Vec::new();
            }
            lifecycle.state = InjectorState::Destroyed;
            (std::mem::take(&mut lifecycle.teardown), lifecycle.span.take())
        };
        let slots = std::mem::take(&mut *self.slots.lock());

        let destroy_span = self.runtime.hooks.destroy(&self.info());
        let teardowns = bag.len();
        let failures = bag.run_all_reverse(self.scope);
        for err in &failures {
            self.report_teardown_error(err);
        }
        drop(slots);
        destroy_span.end();
        if let Some(span) = lifetime_span {
            span.end();
        }

        tracing::debug!(
            injector = self.id.get(),
            scope = %self.scope,
            teardowns,
            failures = failures.len(),
            "injector destroyed"
        );
        failures
    }
}

impl Drop for InjectorInner {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().state != InjectorState::Destroyed {
            self.destroy();
        }
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("id", &self.inner.id)
            .field("scope", &self.inner.scope)
            .field("state", &self.state())
            .finish()
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(any: AnyArc, token: &Token<T>) -> DiResult<Arc<T>> {
    any.downcast::<T>().map_err(|_| DiError::TypeMismatch(token.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::provider::Provider;
    use crate::schema::ConcatSchemaMerger;
    use std::sync::atomic::AtomicUsize;

    fn runtime(modules: &[Arc<Module>]) -> Arc<Runtime> {
        Arc::new(Runtime {
            graph: Arc::new(ModuleGraph::build(modules, &ConcatSchemaMerger).unwrap()),
            hooks: Hooks::default(),
            config: ApplicationConfig::default(),
        })
    }

    #[tokio::test]
    async fn test_broader_scope_cached_in_ancestor() {
        let config = Token::<u32>::new("Config");
        let request = Token::<String>::new("Request");
        let module = Module::builder("m")
            .provider(Provider::builder(&config).global().value(7))
            .unwrap()
            .provider(Provider::builder(&request).global().scope(Scope::Session).factory(|_| "req".to_string()))
            .unwrap()
            .build();

        let root = Injector::root(runtime(&[module]));
        let session = root.session_child(SessionValue::new(())).unwrap();
        let operation = session.operation_child().unwrap();

        assert_eq!(*operation.get(&config).await.unwrap(), 7);
        assert_eq!(*operation.get(&request).await.unwrap(), "req");
        assert!(root.is_cached(&config));
        assert!(session.is_cached(&request));
        assert!(!operation.is_cached(&config));
        assert!(!operation.is_cached(&request));
    }

    #[tokio::test]
    async fn test_narrower_scope_not_found_at_root() {
        let op = Token::<u8>::new("PerOperation");
        let module = Module::builder("m")
            .provider(Provider::builder(&op).global().scope(Scope::Operation).value(1))
            .unwrap()
            .build();
        let root = Injector::root(runtime(&[module]));

        assert!(matches!(
            root.get(&op).await,
            Err(DiError::ProviderNotFound { token: "PerOperation", scope: Scope::Application })
        ));
    }

    #[tokio::test]
    async fn test_failed_construction_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let flaky = Token::<usize>::new("Flaky");
        let counter = attempts.clone();
        let module = Module::builder("m")
            .provider(Provider::builder(&flaky).global().try_factory(move |_| {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err("first attempt fails"),
                    n => Ok(n),
                }
            }))
            .unwrap()
            .build();
        let root = Injector::root(runtime(&[module]));

        assert!(matches!(root.get(&flaky).await, Err(DiError::FactoryFailed { .. })));
        assert!(!root.is_cached(&flaky));
        assert_eq!(*root.get(&flaky).await.unwrap(), 1);
        assert_eq!(*root.get(&flaky).await.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_blocks_resolution() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let token = Token::<u8>::new("Disposable");
        let counter = disposed.clone();
        let module = Module::builder("m")
            .provider(
                Provider::builder(&token)
                    .global()
                    .on_destroy(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .factory(|_| 1),
            )
            .unwrap()
            .build();
        let root = Injector::root(runtime(&[module]));
        root.activate();
        assert_eq!(root.state(), InjectorState::Active);

        root.get(&token).await.unwrap();
        assert!(root.destroy().is_empty());
        assert!(root.destroy().is_empty());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(matches!(root.get(&token).await, Err(DiError::InjectorDestroyed { scope: Scope::Application })));
        assert!(matches!(root.session_child(SessionValue::new(())), Err(DiError::InjectorDestroyed { .. })));
    }

    #[tokio::test]
    async fn test_module_id_requires_module_view() {
        let root = Injector::root(runtime(&[Module::builder("m").build()]));
        assert!(matches!(root.get(&*MODULE_ID).await, Err(DiError::ProviderNotFound { .. })));
        let view = root.for_module(&ModuleId::from("m")).unwrap();
        assert_eq!(view.get(&*MODULE_ID).await.unwrap().as_str(), "m");
        assert!(root.for_module(&ModuleId::from("other")).is_none());
        // SESSION is not available at application scope
        assert!(matches!(view.get(&*SESSION).await, Err(DiError::ProviderNotFound { .. })));
    }
}
