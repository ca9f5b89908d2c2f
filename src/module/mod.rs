//! Modules: units of schema, resolvers and providers composed via imports.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{BoxError, DiError, DiResult};
use crate::execution::{ResolverCall, SessionValue};
use crate::provider::{AnyArc, BoxFuture, Provider};
use crate::schema::{ResolverFn, ResolverOutput};
use crate::token::AnyToken;

mod table;

pub(crate) use table::ProviderTable;

/// Identifier of a module, unique within an application.
///
/// # Examples
///
/// ```
/// use ferrous_modules::ModuleId;
///
/// let id = ModuleId::from("users");
/// assert_eq!(id.as_str(), "users");
/// assert_eq!(id, ModuleId::new(String::from("users")));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&ModuleId> for ModuleId {
    fn from(id: &ModuleId) -> Self {
        id.clone()
    }
}

/// Async context contribution run while building an operation.
pub(crate) type ContextFn =
    Arc<dyn Fn(SessionValue) -> BoxFuture<'static, Result<AnyArc, BoxError>> + Send + Sync>;

pub(crate) struct ContextContribution {
    pub(crate) key: &'static str,
    pub(crate) build: ContextFn,
}

pub(crate) struct ResolverEntry {
    pub(crate) type_name: String,
    pub(crate) field: String,
    pub(crate) resolver: ResolverFn,
}

pub(crate) enum Import {
    Module(Arc<Module>),
    Forward(ModuleId),
}

/// A unit of schema, resolvers and providers.
///
/// Modules are immutable once built and shared behind `Arc`. Importing a
/// module makes its non-global providers visible to the importer; global
/// providers are visible everywhere.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{Module, Provider, Scope, Token, DiResult};
///
/// struct Clock;
///
/// # fn main() -> DiResult<()> {
/// let clock = Token::<Clock>::new("Clock");
///
/// let common = Module::builder("common")
///     .type_defs("scalar DateTime")
///     .provider(Provider::builder(&clock).factory(|_| Clock))?
///     .build();
///
/// let users = Module::builder("users")
///     .type_defs("type User { id: ID! }")
///     .import(&common)
///     .build();
///
/// assert!(common.lookup(clock.erased()).is_ok());
/// assert!(users.lookup(clock.erased()).is_err());
/// # Ok(())
/// # }
/// ```
pub struct Module {
    id: ModuleId,
    type_defs: Vec<String>,
    pub(crate) resolvers: Vec<ResolverEntry>,
    providers: ProviderTable,
    pub(crate) imports: Vec<Import>,
    pub(crate) contexts: Vec<ContextContribution>,
}

impl Module {
    /// Starts building a module with the given id.
    ///
    /// A module is identified by its built `Arc`, not by its contents. The
    /// same `Arc` may be imported any number of times, but two separately
    /// built modules sharing an id fail graph assembly with
    /// [`DiError::DuplicateModule`] even when they declare the same
    /// providers. Build a module once and clone the `Arc` to reuse it.
    pub fn builder(id: impl Into<ModuleId>) -> ModuleBuilder {
        ModuleBuilder {
            module: Module {
                id: id.into(),
                type_defs: Vec::new(),
                resolvers: Vec::new(),
                providers: ProviderTable::default(),
                imports: Vec::new(),
                contexts: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Looks up a recipe in this module's own table only.
    pub fn lookup(&self, token: &AnyToken) -> DiResult<&Provider> {
        self.providers.get(token).ok_or_else(|| DiError::NotFoundInModule {
            token: token.name(),
            module: self.id.clone(),
        })
    }

    /// Own providers in registration order.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn type_defs(&self) -> &[String] {
        &self.type_defs
    }

    /// Ids of directly imported modules, including forward references.
    pub fn import_ids(&self) -> Vec<ModuleId> {
        self.imports
            .iter()
            .map(|import| match import {
                Import::Module(module) => module.id.clone(),
                Import::Forward(id) => id.clone(),
            })
            .collect()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("providers", &self.providers.len())
            .field("resolvers", &self.resolvers.len())
            .field("imports", &self.import_ids())
            .finish()
    }
}

/// Fluent builder for [`Module`].
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    /// Adds a schema fragment (SDL), merged by the schema collaborator.
    pub fn type_defs(mut self, sdl: impl Into<String>) -> Self {
        self.module.type_defs.push(sdl.into());
        self
    }

    /// Adds a field resolver.
    ///
    /// The resolver receives a [`ResolverCall`] whose injector is bound to
    /// this module.
    pub fn resolver<F>(mut self, type_name: impl Into<String>, field: impl Into<String>, resolver: F) -> Self
    where
        F: for<'a> Fn(ResolverCall<'a>) -> BoxFuture<'a, ResolverOutput> + Send + Sync + 'static,
    {
        self.module.resolvers.push(ResolverEntry {
            type_name: type_name.into(),
            field: field.into(),
            resolver: Arc::new(resolver),
        });
        self
    }

    /// Registers a provider.
    ///
    /// Registering the identical recipe twice is a no-op; a different recipe
    /// for a token already in this module fails with `DuplicateProvider`.
    pub fn provider(mut self, provider: Provider) -> DiResult<Self> {
        self.module.providers.register(provider, &self.module.id)?;
        Ok(self)
    }

    /// Registers several providers.
    pub fn providers<I>(mut self, providers: I) -> DiResult<Self>
    where
        I: IntoIterator<Item = Provider>,
    {
        for provider in providers {
            self = self.provider(provider)?;
        }
        Ok(self)
    }

    /// Imports another module.
    pub fn import(mut self, module: &Arc<Module>) -> Self {
        self.module.imports.push(Import::Module(module.clone()));
        self
    }

    /// Imports a module by id, resolved against the application's module set.
    ///
    /// Use this for forward references between modules that cannot hold
    /// each other by value.
    pub fn import_id(mut self, id: impl Into<ModuleId>) -> Self {
        self.module.imports.push(Import::Forward(id.into()));
        self
    }

    /// Adds a context contribution stored under `key` for every operation.
    ///
    /// The closure receives the raw session value. A failure aborts building
    /// the operation with [`DiError::ContextBuild`] naming this module.
    pub fn context<V, E, F, Fut>(mut self, key: &'static str, build: F) -> Self
    where
        V: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(SessionValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let build: ContextFn = Arc::new(move |session| {
            let fut = build(session);
            Box::pin(async move {
                fut.await
                    .map(|value| Arc::new(value) as AnyArc)
                    .map_err(Into::into)
            })
        });
        self.module.contexts.push(ContextContribution { key, build });
        self
    }

    pub fn build(self) -> Arc<Module> {
        Arc::new(self.module)
    }
}
