//! Execution context builder: application boot, sessions and operations.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{ApplicationConfig, InstantiationPolicy};
use crate::error::{DiError, DiResult, TeardownError};
use crate::graph::ModuleGraph;
use crate::hooks::{ContextInfo, Hooks, LifecycleHooks};
use crate::injector::{Injector, ModuleInjector, Runtime};
use crate::internal::ResolutionPath;
use crate::module::Module;
use crate::schema::{ConcatSchemaMerger, MergedSchema, SchemaMerger};

mod context;
mod controller;

pub use context::{ContextMarker, OperationContext, ResolverCall, SessionValue};
pub use controller::{OperationController, OperationOptions, SessionController};

struct ApplicationInner {
    runtime: Arc<Runtime>,
    root: Injector,
    marker: Arc<ContextMarker>,
}

/// A booted application: validated module graph plus application injector.
///
/// Cheap to clone. Every boot builds its own graph and injectors; two
/// applications never share instances.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{Application, DiResult, Module, OperationOptions, Provider, Scope, SessionValue, Token};
///
/// struct Greeter(String);
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> DiResult<()> {
/// let greeter = Token::<Greeter>::new("Greeter");
/// let module = Module::builder("hello")
///     .provider(Provider::builder(&greeter).scope(Scope::Operation).factory(|_| Greeter("hi".into())))?
///     .build();
///
/// let app = Application::builder().module(module).build().await?;
/// let operation = app
///     .create_operation(SessionValue::new(()), OperationOptions::auto_destroy())
///     .await?;
///
/// let view = operation.context().injector_for(&"hello".into()).unwrap();
/// assert_eq!(view.get(&greeter).await?.0, "hi");
/// operation.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub fn graph(&self) -> &Arc<ModuleGraph> {
        &self.inner.runtime.graph
    }

    pub fn schema(&self) -> &MergedSchema {
        self.inner.runtime.graph.schema()
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.inner.runtime.config
    }

    /// The application-scope injector.
    pub fn injector(&self) -> &Injector {
        &self.inner.root
    }

    /// Creates a session injector that several operations can share.
    pub fn create_session(&self, session: SessionValue) -> DiResult<SessionController> {
        let injector = self.inner.root.session_child(session.clone())?;
        injector.activate();
        Ok(SessionController::new(self.clone(), injector, session))
    }

    /// Creates an operation with a private session injector, destroyed
    /// together with the operation.
    pub async fn create_operation(
        &self,
        session: SessionValue,
        options: OperationOptions,
    ) -> DiResult<OperationController> {
        let session_injector = self.inner.root.session_child(session.clone())?;
        session_injector.activate();
        self.build_operation(session_injector, session, true, options).await
    }

    pub(crate) async fn build_operation(
        &self,
        session_injector: Injector,
        session: SessionValue,
        owns_session: bool,
        options: OperationOptions,
    ) -> DiResult<OperationController> {
        let operation = match session_injector.operation_child() {
            Ok(operation) => operation,
            Err(err) => {
                if owns_session {
                    session_injector.destroy();
                }
                return Err(err);
            }
        };
        let span = self.inner.runtime.hooks.context(&ContextInfo {
            operation_injector: operation.id(),
            session_injector: session_injector.id(),
            shared_session: !owns_session,
        });

        let graph = &self.inner.runtime.graph;
        let mut extensions = HashMap::new();
        for module in graph.modules() {
            for contribution in &module.contexts {
                match (contribution.build)(session.clone()).await {
                    Ok(value) => {
                        if extensions.insert(contribution.key, value).is_some() {
                            tracing::debug!(key = contribution.key, module = %module.id(), "context key overridden");
                        }
                    }
                    Err(source) => {
                        operation.destroy();
                        if owns_session {
                            session_injector.destroy();
                        }
                        span.end();
                        tracing::debug!(module = %module.id(), error = %source, "context build failed");
                        return Err(DiError::ContextBuild {
                            module: module.id().clone(),
                            source: Arc::from(source),
                        });
                    }
                }
            }
        }

        operation.activate();
        let context = OperationContext::new(
            self.inner.marker.clone(),
            graph.clone(),
            operation.clone(),
            session,
            extensions,
        );
        span.end();

        Ok(OperationController::new(
            context,
            operation,
            owns_session.then_some(session_injector),
            options,
            self.inner.runtime.config.warn_on_undestroyed,
        ))
    }

    /// Invokes the resolver for `type_name.field`.
    ///
    /// `context` must be an [`OperationContext`] built by this application;
    /// anything else fails with [`DiError::IllegalResolverInvocation`]. The
    /// resolver receives the operation injector bound to the module that
    /// declared it.
    pub async fn execute_resolver(
        &self,
        type_name: &str,
        field: &str,
        context: &(dyn Any + Send + Sync),
        parent: &Value,
        args: &Value,
    ) -> DiResult<Value> {
        let context = context
            .downcast_ref::<OperationContext>()
            .filter(|ctx| Arc::ptr_eq(ctx.marker(), &self.inner.marker))
            .ok_or_else(|| DiError::IllegalResolverInvocation {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })?;

        let binding = self
            .schema()
            .binding(type_name, field)
            .ok_or_else(|| DiError::UnknownResolver {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })?;

        let injector = context.injector();
        if injector.is_destroyed() {
            return Err(DiError::InjectorDestroyed { scope: injector.scope() });
        }

        let call = ResolverCall {
            context,
            injector: ModuleInjector::new(injector.clone(), binding.module_index, binding.module.clone()),
            parent,
            args,
        };
        (binding.resolver)(call)
            .await
            .map_err(|source| DiError::ResolverFailed {
                type_name: type_name.to_string(),
                field: field.to_string(),
                source: Arc::from(source),
            })
    }

    /// Destroys the application injector. Idempotent.
    pub fn shutdown(&self) -> Vec<TeardownError> {
        tracing::info!("application shutting down");
        self.inner.root.destroy()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("graph", &self.inner.runtime.graph)
            .field("config", &self.inner.runtime.config)
            .field("injector", &self.inner.root)
            .finish()
    }
}

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    modules: Vec<Arc<Module>>,
    config: ApplicationConfig,
    hooks: Hooks,
    merger: Box<dyn SchemaMerger>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            config: ApplicationConfig::default(),
            hooks: Hooks::default(),
            merger: Box::new(ConcatSchemaMerger),
        }
    }
}

impl ApplicationBuilder {
    /// Adds a top-level module. Imports are discovered from it.
    pub fn module(mut self, module: Arc<Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn modules<I>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = Arc<Module>>,
    {
        self.modules.extend(modules);
        self
    }

    pub fn config(mut self, config: ApplicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers lifecycle hooks. May be called several times.
    pub fn hooks<H: LifecycleHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks.add(Arc::new(hooks));
        self
    }

    pub fn shared_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks.add(hooks);
        self
    }

    pub fn schema_merger<M: SchemaMerger + 'static>(mut self, merger: M) -> Self {
        self.merger = Box::new(merger);
        self
    }

    /// Assembles and validates the module graph, then creates the
    /// application injector.
    ///
    /// Graph errors abort the boot before any factory runs. With
    /// [`InstantiationPolicy::Eager`], every application-scoped provider is
    /// constructed here and the first failure aborts the boot.
    pub async fn build(self) -> DiResult<Application> {
        self.config.validate()?;
        let graph = Arc::new(ModuleGraph::build(&self.modules, self.merger.as_ref())?);
        let runtime = Arc::new(Runtime {
            graph: graph.clone(),
            hooks: self.hooks,
            config: self.config,
        });
        let root = Injector::root(runtime.clone());

        if runtime.config.instantiation == InstantiationPolicy::Eager {
            for idx in graph.application_providers() {
                let token = &graph.provider_at(idx).provider.token;
                let result = match ResolutionPath::new().enter(token, runtime.config.max_resolution_depth) {
                    Ok(path) => root.instantiate(idx, path).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = result {
                    root.destroy();
                    return Err(err);
                }
            }
        }
        root.activate();

        tracing::info!(
            modules = graph.modules().len(),
            providers = graph.provider_count(),
            instantiation = ?runtime.config.instantiation,
            "application ready"
        );
        Ok(Application {
            inner: Arc::new(ApplicationInner {
                runtime,
                root,
                marker: ContextMarker::new(),
            }),
        })
    }
}
