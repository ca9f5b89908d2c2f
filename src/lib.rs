//! # ferrous-modules
//!
//! Hierarchical dependency injection and module composition for server
//! applications built from independently developed modules.
//!
//! ## Features
//!
//! - **Identity tokens**: providers are keyed by [`Token`] identity, never by name
//! - **Three scopes**: Application, Session and Operation injectors chained parent to child
//! - **Module graph**: imports flattened and validated at boot, with global providers as an explicit escape hatch
//! - **Boot-time validation**: missing providers, scope violations and cycles abort startup
//! - **Deterministic teardown**: operation injectors are destroyed on completion, error or cancellation
//! - **Lifecycle hooks**: injector, context and destroy events for observability
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_modules::{Application, DiResult, Module, OperationOptions, Provider, Scope, SessionValue, Token};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserRepository {
//!     db: Arc<Database>,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> DiResult<()> {
//! let database = Token::<Database>::new("Database");
//! let users = Token::<UserRepository>::new("UserRepository");
//!
//! let db_module = Module::builder("db")
//!     .provider(
//!         Provider::builder(&database)
//!             .global()
//!             .value(Database { url: "postgres://localhost".into() }),
//!     )?
//!     .build();
//!
//! let db = database.clone();
//! let users_module = Module::builder("users")
//!     .type_defs("type User { id: ID! }")
//!     .provider(
//!         Provider::builder(&users)
//!             .scope(Scope::Operation)
//!             .depends_on(&database)
//!             .try_factory(move |ctx| Ok::<_, ferrous_modules::DiError>(UserRepository { db: ctx.get(&db)? })),
//!     )?
//!     .build();
//!
//! let app = Application::builder()
//!     .module(db_module)
//!     .module(users_module)
//!     .build()
//!     .await?;
//!
//! let operation = app
//!     .create_operation(SessionValue::new("request-1"), OperationOptions::auto_destroy())
//!     .await?;
//! let repo = operation
//!     .context()
//!     .injector_for(&"users".into())
//!     .unwrap()
//!     .get(&users)
//!     .await?;
//! assert_eq!(repo.db.url, "postgres://localhost");
//! operation.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Scopes
//!
//! - **Application**: one instance per booted application
//! - **Session**: one instance per external request or connection
//! - **Operation**: one instance per unit of work inside a session
//!
//! A provider may depend only on providers of its own scope or a broader
//! one. Broader-scoped instances are always cached by the injector of their
//! own level, never by the narrower injector that requested them.

pub mod config;
pub mod error;
pub mod execution;
pub mod graph;
pub mod hooks;
pub mod injector;
pub mod module;
pub mod provider;
pub mod schema;
pub mod scope;
pub mod token;
pub mod traits;

mod internal;

pub use config::{ApplicationConfig, InstantiationPolicy};
pub use error::{BoxError, DiError, DiResult, SharedError, TeardownError};
pub use execution::{
    Application, ApplicationBuilder, ContextMarker, OperationContext, OperationController, OperationOptions,
    ResolverCall, SessionController, SessionValue,
};
pub use graph::ModuleGraph;
pub use hooks::{ContextInfo, InjectorInfo, LifecycleHooks, SpanEnd, TracingHooks};
pub use injector::{Injector, InjectorId, InjectorState, ModuleInjector};
pub use module::{Module, ModuleBuilder, ModuleId};
pub use provider::{AsyncFactory, BoxFuture, Provider, ProviderBuilder, ProviderContext};
pub use schema::{ConcatSchemaMerger, MergedSchema, ResolverFn, ResolverOutput, ResolverSource, SchemaMerger, TypeDefsSource};
pub use scope::Scope;
pub use token::{AnyToken, Token, TokenId, MODULE_ID, SESSION};
pub use traits::Dispose;
