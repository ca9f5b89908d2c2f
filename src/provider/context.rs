//! Context handed to provider factories.

use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::module::ModuleId;
use crate::provider::AnyArc;
use crate::scope::Scope;
use crate::token::{AnyToken, Token, MODULE_ID};

/// Resolved dependencies and identity passed to a provider factory.
///
/// Dependencies are resolved before the factory runs, in the order they were
/// declared with [`ProviderBuilder::depends_on`](crate::ProviderBuilder::depends_on).
/// Only declared tokens (plus [`MODULE_ID`]) can be read.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{Provider, Token};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let config = Token::<Config>::new("Config");
/// let database = Token::<Database>::new("Database");
///
/// let config_dep = config.clone();
/// let provider = Provider::builder(&database)
///     .depends_on(&config)
///     .try_factory(move |ctx| {
///         let config: Arc<Config> = ctx.get(&config_dep)?;
///         Ok::<_, ferrous_modules::DiError>(Database { url: config.url.clone() })
///     });
/// assert_eq!(provider.dependencies().len(), 1);
/// ```
pub struct ProviderContext {
    provider: &'static str,
    module: ModuleId,
    scope: Scope,
    dependencies: Vec<(AnyToken, AnyArc)>,
}

impl ProviderContext {
    pub(crate) fn new(
        provider: &'static str,
        module: ModuleId,
        scope: Scope,
        dependencies: Vec<(AnyToken, AnyArc)>,
    ) -> Self {
        Self {
            provider,
            module,
            scope,
            dependencies,
        }
    }

    /// Returns a declared dependency.
    ///
    /// Fails with [`DiError::UndeclaredDependency`] for tokens the provider
    /// did not declare.
    pub fn get<D: Send + Sync + 'static>(&self, token: &Token<D>) -> DiResult<Arc<D>> {
        let any = if let Some((_, value)) = self.dependencies.iter().find(|(t, _)| token == t) {
            value.clone()
        } else if token == MODULE_ID.erased() {
            Arc::new(self.module.clone()) as AnyArc
        } else {
            return Err(DiError::UndeclaredDependency {
                provider: self.provider,
                dependency: token.name(),
            });
        };
        any.downcast::<D>()
            .map_err(|_| DiError::TypeMismatch(token.name()))
    }

    /// Id of the module that owns the provider being constructed.
    pub fn module_id(&self) -> &ModuleId {
        &self.module
    }

    /// Scope of the injector constructing the instance.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Name of the token being constructed.
    pub fn provider_name(&self) -> &'static str {
        self.provider
    }
}
