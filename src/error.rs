//! Error types for module composition and scoped resolution.

use std::sync::Arc;

use crate::module::ModuleId;
use crate::scope::Scope;

/// Boxed error returned by factories, context contributions and resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared cause carried inside [`DiError`].
///
/// Causes are reference counted so a failed construction can be reported to
/// every caller that was awaiting it.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Composition and resolution errors.
///
/// Every error returned from
/// [`ApplicationBuilder::build`](crate::ApplicationBuilder::build) aborts
/// startup. Errors raised while resolving are scoped to the operation that
/// triggered them and are surfaced to the caller of `get`.
/// [`DiError::is_boot_fatal`] tells which variants never occur at
/// resolution time.
///
/// # Examples
///
/// ```rust
/// use ferrous_modules::{DiError, Scope};
///
/// let err = DiError::ProviderNotFound { token: "Database", scope: Scope::Application };
/// assert_eq!(err.to_string(), "no provider for `Database` in application scope");
/// assert!(!err.is_boot_fatal());
///
/// let cycle = DiError::CircularDependency { cycle: vec!["A", "B", "A"] };
/// assert_eq!(cycle.to_string(), "circular dependency: A -> B -> A");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiError {
    /// Same token registered twice in one module with different recipes
    #[error("`{token}` is already registered in module `{module}` with a different recipe")]
    DuplicateProvider { token: &'static str, module: ModuleId },

    /// Two modules declare incompatible recipes for one token
    #[error("conflicting providers for `{token}` in modules `{first}` and `{second}`")]
    ConflictingProvider {
        token: &'static str,
        first: ModuleId,
        second: ModuleId,
    },

    /// Lookup in a single module's own table failed
    #[error("`{token}` is not provided by module `{module}`")]
    NotFoundInModule { token: &'static str, module: ModuleId },

    /// Two different module values share one id
    #[error("module id `{id}` is used by two different modules")]
    DuplicateModule { id: ModuleId },

    /// A forward import names a module that is not part of the application
    #[error("module `{importer}` imports unknown module `{id}`")]
    UnknownModule { importer: ModuleId, id: ModuleId },

    /// A module imports itself, directly or transitively
    #[error("circular module import: {}", join_modules(.cycle))]
    CircularModuleImport { cycle: Vec<ModuleId> },

    /// Provider dependencies form a cycle (includes path)
    #[error("circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<&'static str> },

    /// A provider depends directly on a narrower-scoped provider
    #[error("{scope}-scoped `{provider}` cannot depend on {dependency_scope}-scoped `{dependency}`")]
    ScopeViolation {
        provider: &'static str,
        scope: Scope,
        dependency: &'static str,
        dependency_scope: Scope,
    },

    /// No provider visible for the token at the scope actually searched
    #[error("no provider for `{token}` in {scope} scope")]
    ProviderNotFound { token: &'static str, scope: Scope },

    /// A factory asked its context for a token it did not declare
    #[error("`{provider}` did not declare a dependency on `{dependency}`")]
    UndeclaredDependency {
        provider: &'static str,
        dependency: &'static str,
    },

    /// The injector was destroyed before or during resolution
    #[error("{scope} injector has been destroyed")]
    InjectorDestroyed { scope: Scope },

    /// A provider factory returned an error
    #[error("factory for `{token}` failed: {source}")]
    FactoryFailed {
        token: &'static str,
        source: SharedError,
    },

    /// Type downcast failed
    #[error("type mismatch for `{0}`")]
    TypeMismatch(&'static str),

    /// Maximum resolution depth exceeded
    #[error("max resolution depth {0} exceeded")]
    DepthExceeded(usize),

    /// A module's context contribution failed while building an operation
    #[error("context builder of module `{module}` failed: {source}")]
    ContextBuild { module: ModuleId, source: SharedError },

    /// A resolver was invoked with a context this application did not build
    #[error("resolver `{type_name}.{field}` invoked with a context not built by this application")]
    IllegalResolverInvocation { type_name: String, field: String },

    /// No resolver is registered for the field
    #[error("no resolver for `{type_name}.{field}`")]
    UnknownResolver { type_name: String, field: String },

    /// A resolver returned an error
    #[error("resolver `{type_name}.{field}` failed: {source}")]
    ResolverFailed {
        type_name: String,
        field: String,
        source: SharedError,
    },

    /// The schema-merging collaborator rejected a module's contribution
    #[error("schema merge failed in module `{module}`: {message}")]
    Schema { module: ModuleId, message: String },

    /// Invalid application configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DiError {
    /// Returns true for variants that can only come from graph assembly.
    ///
    /// This classifies the variant, not where it was raised.
    /// `ProviderNotFound` and `CircularDependency` return false because
    /// injectors also raise them per operation, yet
    /// [`ModuleGraph::build`](crate::ModuleGraph::build) returns them too,
    /// and every error out of `build` aborts startup.
    pub fn is_boot_fatal(&self) -> bool {
        matches!(
            self,
            DiError::DuplicateProvider { .. }
                | DiError::ConflictingProvider { .. }
                | DiError::DuplicateModule { .. }
                | DiError::UnknownModule { .. }
                | DiError::CircularModuleImport { .. }
                | DiError::ScopeViolation { .. }
                | DiError::Schema { .. }
                | DiError::Config(_)
        )
    }

    pub(crate) fn factory_failed(token: &'static str, source: BoxError) -> Self {
        DiError::FactoryFailed {
            token,
            source: Arc::from(source),
        }
    }
}

fn join_modules(cycle: &[ModuleId]) -> String {
    cycle
        .iter()
        .map(ModuleId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for composition and resolution
pub type DiResult<T> = Result<T, DiError>;

/// A teardown hook that failed or panicked during `destroy()`.
///
/// Teardown failures never abort the remaining hooks and never propagate out
/// of `destroy()`; they are logged, handed to the lifecycle hooks, and
/// returned for inspection.
#[derive(Debug, Clone, thiserror::Error)]
#[error("teardown of `{token}` in {scope} scope failed: {message}")]
pub struct TeardownError {
    /// Token whose instance failed to tear down
    pub token: &'static str,
    /// Scope of the injector being destroyed
    pub scope: Scope,
    /// Error or panic message
    pub message: String,
}
