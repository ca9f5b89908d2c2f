//! Schema merging seam.
//!
//! Schema text and resolver maps are merged by an external collaborator
//! implementing [`SchemaMerger`]. The runtime only needs to know which module
//! declared each resolver so the resolver can be handed a module-bound
//! injector.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{BoxError, DiError, DiResult};
use crate::execution::ResolverCall;
use crate::module::ModuleId;
use crate::provider::BoxFuture;

/// Result of a field resolver.
pub type ResolverOutput = Result<Value, BoxError>;

/// Type-erased field resolver.
pub type ResolverFn = Arc<dyn for<'a> Fn(ResolverCall<'a>) -> BoxFuture<'a, ResolverOutput> + Send + Sync>;

/// Schema fragments contributed by one module.
#[derive(Debug, Clone, Copy)]
pub struct TypeDefsSource<'a> {
    pub module: &'a ModuleId,
    pub type_defs: &'a [String],
}

/// A resolver contributed by one module.
#[derive(Clone, Copy)]
pub struct ResolverSource<'a> {
    pub module: &'a ModuleId,
    pub(crate) module_index: usize,
    pub type_name: &'a str,
    pub field: &'a str,
    pub(crate) resolver: &'a ResolverFn,
}

impl fmt::Debug for ResolverSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.type_name, self.field, self.module)
    }
}

#[derive(Clone)]
pub(crate) struct ResolverBinding {
    pub(crate) module: ModuleId,
    pub(crate) module_index: usize,
    pub(crate) resolver: ResolverFn,
}

/// Merged schema text and resolver table of an application.
#[derive(Clone, Default)]
pub struct MergedSchema {
    type_defs: String,
    resolvers: HashMap<String, HashMap<String, ResolverBinding>>,
}

impl MergedSchema {
    pub fn new(type_defs: impl Into<String>) -> Self {
        Self {
            type_defs: type_defs.into(),
            resolvers: HashMap::new(),
        }
    }

    /// Binds a resolver. Returns the module that already owns the field, if any,
    /// in which case the existing binding is kept.
    pub fn bind(&mut self, source: &ResolverSource<'_>) -> Option<ModuleId> {
        let fields = self.resolvers.entry(source.type_name.to_string()).or_default();
        if let Some(existing) = fields.get(source.field) {
            return Some(existing.module.clone());
        }
        fields.insert(
            source.field.to_string(),
            ResolverBinding {
                module: source.module.clone(),
                module_index: source.module_index,
                resolver: source.resolver.clone(),
            },
        );
        None
    }

    pub fn type_defs(&self) -> &str {
        &self.type_defs
    }

    pub fn has_resolver(&self, type_name: &str, field: &str) -> bool {
        self.binding(type_name, field).is_some()
    }

    /// Module that declared the resolver for `type_name.field`.
    pub fn resolver_module(&self, type_name: &str, field: &str) -> Option<&ModuleId> {
        self.binding(type_name, field).map(|b| &b.module)
    }

    pub fn resolver_count(&self) -> usize {
        self.resolvers.values().map(HashMap::len).sum()
    }

    pub(crate) fn binding(&self, type_name: &str, field: &str) -> Option<&ResolverBinding> {
        self.resolvers.get(type_name)?.get(field)
    }
}

impl fmt::Debug for MergedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedSchema")
            .field("type_defs", &self.type_defs.len())
            .field("resolvers", &self.resolver_count())
            .finish()
    }
}

/// Merges module schema fragments and resolvers into one schema.
///
/// Sources are passed in module order (imports before importers).
pub trait SchemaMerger: Send + Sync {
    fn merge(
        &self,
        type_defs: &[TypeDefsSource<'_>],
        resolvers: &[ResolverSource<'_>],
    ) -> DiResult<MergedSchema>;
}

/// Default merger: concatenates SDL fragments and rejects a field resolved by
/// two modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatSchemaMerger;

impl SchemaMerger for ConcatSchemaMerger {
    fn merge(
        &self,
        type_defs: &[TypeDefsSource<'_>],
        resolvers: &[ResolverSource<'_>],
    ) -> DiResult<MergedSchema> {
        let sdl = type_defs
            .iter()
            .flat_map(|source| source.type_defs.iter())
            .map(|fragment| fragment.trim())
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut schema = MergedSchema::new(sdl);
        for source in resolvers {
            if let Some(owner) = schema.bind(source) {
                return Err(DiError::Schema {
                    module: source.module.clone(),
                    message: format!(
                        "resolver `{}.{}` is already defined by module `{}`",
                        source.type_name, source.field, owner
                    ),
                });
            }
        }
        Ok(schema)
    }
}
