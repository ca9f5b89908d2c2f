//! Operation contexts and the values resolvers receive.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::graph::ModuleGraph;
use crate::injector::{Injector, ModuleInjector};
use crate::module::ModuleId;
use crate::provider::AnyArc;
use crate::schema::MergedSchema;

/// Raw transport value of a session (a request, a connection, ...).
///
/// # Examples
///
/// ```
/// use ferrous_modules::SessionValue;
///
/// struct Request { path: &'static str }
///
/// let session = SessionValue::new(Request { path: "/graphql" });
/// assert_eq!(session.downcast_ref::<Request>().map(|r| r.path), Some("/graphql"));
/// assert!(session.downcast_ref::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct SessionValue(Arc<dyn Any + Send + Sync>);

impl SessionValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Whether both values wrap the same allocation.
    pub fn ptr_eq(&self, other: &SessionValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionValue(..)")
    }
}

/// Identity marker shared by every context one application builds.
///
/// Compared by pointer, never by contents.
pub struct ContextMarker {
    _private: (),
}

impl ContextMarker {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { _private: () })
    }
}

struct ContextInner {
    marker: Arc<ContextMarker>,
    graph: Arc<ModuleGraph>,
    injector: Injector,
    session: SessionValue,
    extensions: HashMap<&'static str, AnyArc>,
}

/// Context of one operation, handed to resolvers.
///
/// Cheap to clone. Holds the operation injector; once the operation is
/// destroyed, resolving through a retained context fails with
/// [`DiError::InjectorDestroyed`](crate::DiError::InjectorDestroyed).
#[derive(Clone)]
pub struct OperationContext {
    inner: Arc<ContextInner>,
}

impl OperationContext {
    pub(crate) fn new(
        marker: Arc<ContextMarker>,
        graph: Arc<ModuleGraph>,
        injector: Injector,
        session: SessionValue,
        extensions: HashMap<&'static str, AnyArc>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                marker,
                graph,
                injector,
                session,
                extensions,
            }),
        }
    }

    /// The operation injector, resolving global providers.
    pub fn injector(&self) -> &Injector {
        &self.inner.injector
    }

    /// The operation injector bound to module `id`.
    pub fn injector_for(&self, id: &ModuleId) -> Option<ModuleInjector> {
        self.inner.injector.for_module(id)
    }

    pub fn session(&self) -> &SessionValue {
        &self.inner.session
    }

    pub fn schema(&self) -> &MergedSchema {
        self.inner.graph.schema()
    }

    /// Value contributed under `key` by a module context builder.
    pub fn extension<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.inner.extensions.get(key)?.clone().downcast::<V>().ok()
    }

    pub(crate) fn marker(&self) -> &Arc<ContextMarker> {
        &self.inner.marker
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&&str> = self.inner.extensions.keys().collect();
        keys.sort();
        f.debug_struct("OperationContext")
            .field("injector", &self.inner.injector)
            .field("extensions", &keys)
            .finish()
    }
}

/// Arguments of a resolver invocation.
pub struct ResolverCall<'a> {
    pub context: &'a OperationContext,
    /// Operation injector bound to the module that declared the resolver
    pub injector: ModuleInjector,
    pub parent: &'a Value,
    pub args: &'a Value,
}
