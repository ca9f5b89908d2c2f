//! Module graph assembly and validation.
//!
//! [`ModuleGraph::build`] turns an ordered list of top-level modules into an
//! immutable, conflict-checked composition. Every error it reports is fatal
//! at boot and is raised before any factory runs.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::module::{Import, Module, ModuleId};
use crate::provider::Provider;
use crate::schema::{MergedSchema, ResolverSource, SchemaMerger, TypeDefsSource};
use crate::scope::Scope;
use crate::token::{AnyToken, TokenId, MODULE_ID, SESSION};

/// A provider in the union table together with the module that owns it.
pub(crate) struct GraphProvider {
    pub(crate) provider: Provider,
    pub(crate) owner: usize,
}

/// The flattened, conflict-checked union of all modules of an application.
///
/// Modules are stored in dependency order: every module comes after the
/// modules it imports.
///
/// # Examples
///
/// ```
/// use ferrous_modules::{ConcatSchemaMerger, DiResult, Module, ModuleGraph, Provider, Token};
///
/// # fn main() -> DiResult<()> {
/// let pool = Token::<&'static str>::new("Pool");
/// let db = Module::builder("db")
///     .provider(Provider::builder(&pool).global().value("postgres://"))?
///     .build();
/// let users = Module::builder("users").build();
///
/// let graph = ModuleGraph::build(&[users, db], &ConcatSchemaMerger)?;
/// // global providers are visible without an import
/// assert!(graph.is_visible(&"users".into(), pool.erased()));
/// # Ok(())
/// # }
/// ```
pub struct ModuleGraph {
    modules: Vec<Arc<Module>>,
    index: HashMap<ModuleId, usize>,
    imports: Vec<Vec<usize>>,
    providers: Vec<GraphProvider>,
    by_token: HashMap<TokenId, usize>,
    visible: Vec<HashSet<TokenId>>,
    globals: Vec<usize>,
    schema: MergedSchema,
}

impl ModuleGraph {
    /// Flattens, merges and validates `modules`.
    pub fn build(modules: &[Arc<Module>], merger: &dyn SchemaMerger) -> DiResult<Self> {
        let (found, found_index) = collect_modules(modules)?;
        let edges = resolve_imports(&found, &found_index)?;
        let order = dependency_order(&found, &edges)?;

        let mut position = vec![0usize; found.len()];
        for (pos, &old) in order.iter().enumerate() {
            position[old] = pos;
        }
        let modules: Vec<Arc<Module>> = order.iter().map(|&old| found[old].clone()).collect();
        let imports: Vec<Vec<usize>> = order
            .iter()
            .map(|&old| edges[old].iter().map(|&dep| position[dep]).collect())
            .collect();
        let index: HashMap<ModuleId, usize> = modules
            .iter()
            .enumerate()
            .map(|(pos, module)| (module.id().clone(), pos))
            .collect();

        let (providers, by_token) = union_providers(&modules)?;
        let globals = providers
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.provider.global)
            .map(|(idx, _)| idx)
            .collect();

        let mut visible: Vec<HashSet<TokenId>> = Vec::with_capacity(modules.len());
        for (pos, module) in modules.iter().enumerate() {
            let mut tokens: HashSet<TokenId> = module.providers().map(|p| p.token.id()).collect();
            for &dep in &imports[pos] {
                // imports precede importers, so their sets are complete
                tokens.extend(visible[dep].iter().copied());
            }
            visible.push(tokens);
        }

        let mut graph = ModuleGraph {
            modules,
            index,
            imports,
            providers,
            by_token,
            visible,
            globals,
            schema: MergedSchema::default(),
        };
        graph.detect_provider_cycles()?;
        graph.validate_dependencies()?;
        graph.schema = graph.merge_schema(merger)?;

        tracing::debug!(
            modules = graph.modules.len(),
            providers = graph.providers.len(),
            globals = graph.globals.len(),
            resolvers = graph.schema.resolver_count(),
            "module graph assembled"
        );
        Ok(graph)
    }

    /// Modules in dependency order.
    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub fn module(&self, id: &ModuleId) -> Option<&Arc<Module>> {
        self.index.get(id).map(|&pos| &self.modules[pos])
    }

    /// Ids of the modules directly imported by `id`.
    pub fn imports_of(&self, id: &ModuleId) -> Option<Vec<&ModuleId>> {
        let pos = *self.index.get(id)?;
        Some(self.imports[pos].iter().map(|&dep| self.modules[dep].id()).collect())
    }

    pub fn schema(&self) -> &MergedSchema {
        &self.schema
    }

    /// Number of distinct recipes in the union table.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Providers declared global, visible to every module.
    pub fn globals(&self) -> impl Iterator<Item = &Provider> {
        self.globals.iter().map(|&idx| &self.providers[idx].provider)
    }

    /// Whether `token` is resolvable from the view of module `id`.
    pub fn is_visible(&self, id: &ModuleId, token: &AnyToken) -> bool {
        self.index
            .get(id)
            .and_then(|&pos| self.lookup(Some(pos), token))
            .is_some()
    }

    /// Finds the provider for `token` as seen from module `view`.
    ///
    /// `None` as view sees global providers only.
    pub(crate) fn lookup(&self, view: Option<usize>, token: &AnyToken) -> Option<usize> {
        let idx = *self.by_token.get(&token.id())?;
        if self.providers[idx].provider.global {
            return Some(idx);
        }
        match view {
            Some(pos) if self.visible[pos].contains(&token.id()) => Some(idx),
            _ => None,
        }
    }

    /// Union-table index of `token`, ignoring visibility.
    pub(crate) fn provider_index(&self, token: &AnyToken) -> Option<usize> {
        self.by_token.get(&token.id()).copied()
    }

    pub(crate) fn module_index(&self, id: &ModuleId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn module_at(&self, pos: usize) -> &Arc<Module> {
        &self.modules[pos]
    }

    pub(crate) fn provider_at(&self, idx: usize) -> &GraphProvider {
        &self.providers[idx]
    }

    /// Indices of application-scoped providers, in union-table order.
    pub(crate) fn application_providers(&self) -> impl Iterator<Item = usize> + '_ {
        self.providers
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.provider.scope == Scope::Application)
            .map(|(idx, _)| idx)
    }

    /// Scope a dependency resolves at, as seen from the owning module.
    fn dependency_scope(&self, owner: usize, dependency: &AnyToken) -> Option<Scope> {
        if dependency == MODULE_ID.erased() {
            return Some(Scope::Application);
        }
        if dependency == SESSION.erased() {
            return Some(Scope::Session);
        }
        self.lookup(Some(owner), dependency)
            .map(|idx| self.providers[idx].provider.scope)
    }

    fn validate_dependencies(&self) -> DiResult<()> {
        for entry in &self.providers {
            let provider = &entry.provider;
            for dependency in &provider.dependencies {
                let Some(dependency_scope) = self.dependency_scope(entry.owner, dependency) else {
                    return Err(DiError::ProviderNotFound {
                        token: dependency.name(),
                        scope: provider.scope,
                    });
                };
                if !provider.scope.can_depend_on(dependency_scope) {
                    return Err(DiError::ScopeViolation {
                        provider: provider.token.name(),
                        scope: provider.scope,
                        dependency: dependency.name(),
                        dependency_scope,
                    });
                }
            }
        }
        Ok(())
    }

    fn detect_provider_cycles(&self) -> DiResult<()> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        for idx in 0..self.providers.len() {
            if let Some(cycle) = self.dfs_cycles(idx, &mut visited, &mut path) {
                return Err(DiError::CircularDependency { cycle });
            }
        }
        Ok(())
    }

    fn dfs_cycles(
        &self,
        current: usize,
        visited: &mut HashSet<usize>,
        path: &mut Vec<usize>,
    ) -> Option<Vec<&'static str>> {
        if let Some(start) = path.iter().position(|&idx| idx == current) {
            return Some(
                path[start..]
                    .iter()
                    .chain(std::iter::once(&current))
                    .map(|&idx| self.providers[idx].provider.token.name())
                    .collect(),
            );
        }
        if !visited.insert(current) {
            return None;
        }

        path.push(current);
        let entry = &self.providers[current];
        for dependency in &entry.provider.dependencies {
            if let Some(next) = self.lookup(Some(entry.owner), dependency) {
                if let Some(cycle) = self.dfs_cycles(next, visited, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }

    fn merge_schema(&self, merger: &dyn SchemaMerger) -> DiResult<MergedSchema> {
        let type_defs: Vec<TypeDefsSource<'_>> = self
            .modules
            .iter()
            .map(|module| TypeDefsSource {
                module: module.id(),
                type_defs: module.type_defs(),
            })
            .collect();
        let resolvers: Vec<ResolverSource<'_>> = self
            .modules
            .iter()
            .enumerate()
            .flat_map(|(pos, module)| {
                module.resolvers.iter().map(move |entry| ResolverSource {
                    module: module.id(),
                    module_index: pos,
                    type_name: &entry.type_name,
                    field: &entry.field,
                    resolver: &entry.resolver,
                })
            })
            .collect();
        merger.merge(&type_defs, &resolvers)
    }

    /// Human-readable dump of modules, imports and providers.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for (pos, module) in self.modules.iter().enumerate() {
            let imports: Vec<&str> = self.imports[pos]
                .iter()
                .map(|&dep| self.modules[dep].id().as_str())
                .collect();
            let _ = writeln!(out, "module {} imports [{}]", module.id(), imports.join(", "));
            for entry in self.providers.iter().filter(|entry| entry.owner == pos) {
                let provider = &entry.provider;
                let deps: Vec<&str> = provider.dependencies.iter().map(AnyToken::name).collect();
                let _ = writeln!(
                    out,
                    "  {}{} [{}] <- [{}]",
                    provider.token.name(),
                    if provider.global { " (global)" } else { "" },
                    provider.scope,
                    deps.join(", ")
                );
            }
        }
        out
    }
}

impl fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("modules", &self.modules.iter().map(|m| m.id()).collect::<Vec<_>>())
            .field("providers", &self.providers.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

/// Walks direct imports and indexes every reachable module by id.
fn collect_modules(roots: &[Arc<Module>]) -> DiResult<(Vec<Arc<Module>>, HashMap<ModuleId, usize>)> {
    let mut found: Vec<Arc<Module>> = Vec::new();
    let mut index: HashMap<ModuleId, usize> = HashMap::new();
    let mut stack: Vec<Arc<Module>> = roots.iter().rev().cloned().collect();

    while let Some(module) = stack.pop() {
        if let Some(&pos) = index.get(module.id()) {
            if !Arc::ptr_eq(&found[pos], &module) {
                return Err(DiError::DuplicateModule { id: module.id().clone() });
            }
            continue;
        }
        index.insert(module.id().clone(), found.len());
        for import in module.imports.iter().rev() {
            if let Import::Module(dep) = import {
                stack.push(dep.clone());
            }
        }
        found.push(module);
    }
    Ok((found, index))
}

fn resolve_imports(found: &[Arc<Module>], index: &HashMap<ModuleId, usize>) -> DiResult<Vec<Vec<usize>>> {
    found
        .iter()
        .map(|module| {
            module
                .import_ids()
                .into_iter()
                .map(|id| match index.get(&id) {
                    Some(&pos) => Ok(pos),
                    None => Err(DiError::UnknownModule {
                        importer: module.id().clone(),
                        id,
                    }),
                })
                .collect()
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    New,
    InProgress,
    Done,
}

/// Post-order DFS: imports come before importers. Fails on an import cycle.
fn dependency_order(found: &[Arc<Module>], edges: &[Vec<usize>]) -> DiResult<Vec<usize>> {
    fn visit(
        node: usize,
        found: &[Arc<Module>],
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> DiResult<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .chain(std::iter::once(&node))
                    .map(|&n| found[n].id().clone())
                    .collect();
                return Err(DiError::CircularModuleImport { cycle });
            }
            Mark::New => {}
        }

        marks[node] = Mark::InProgress;
        path.push(node);
        for &next in &edges[node] {
            visit(next, found, edges, marks, path, order)?;
        }
        path.pop();
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    let mut marks = vec![Mark::New; found.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(found.len());
    for node in 0..found.len() {
        visit(node, found, edges, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn union_providers(modules: &[Arc<Module>]) -> DiResult<(Vec<GraphProvider>, HashMap<TokenId, usize>)> {
    let mut providers: Vec<GraphProvider> = Vec::new();
    let mut by_token: HashMap<TokenId, usize> = HashMap::new();

    for (pos, module) in modules.iter().enumerate() {
        for provider in module.providers() {
            if provider.token == *MODULE_ID.erased() || provider.token == *SESSION.erased() {
                return Err(DiError::DuplicateProvider {
                    token: provider.token.name(),
                    module: module.id().clone(),
                });
            }
            match by_token.get(&provider.token.id()) {
                Some(&existing) => {
                    let entry: &GraphProvider = &providers[existing];
                    if !entry.provider.same_recipe(provider) {
                        return Err(DiError::ConflictingProvider {
                            token: provider.token.name(),
                            first: modules[entry.owner].id().clone(),
                            second: module.id().clone(),
                        });
                    }
                }
                None => {
                    by_token.insert(provider.token.id(), providers.len());
                    providers.push(GraphProvider {
                        provider: provider.clone(),
                        owner: pos,
                    });
                }
            }
        }
    }
    Ok((providers, by_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ConcatSchemaMerger;
    use crate::token::Token;

    fn build(modules: &[Arc<Module>]) -> DiResult<ModuleGraph> {
        ModuleGraph::build(modules, &ConcatSchemaMerger)
    }

    #[test]
    fn test_imports_precede_importers() {
        let base = Module::builder("base").type_defs("scalar Base").build();
        let mid = Module::builder("mid").import(&base).type_defs("scalar Mid").build();
        let top = Module::builder("top").import(&mid).import(&base).build();

        let graph = build(&[top]).unwrap();
        let ids: Vec<&str> = graph.modules().iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["base", "mid", "top"]);
        assert_eq!(graph.schema().type_defs(), "scalar Base\n\nscalar Mid");
    }

    #[test]
    fn test_forward_import_cycle_is_named() {
        let a = Module::builder("a").import_id("b").build();
        let b = Module::builder("b").import_id("a").build();

        match build(&[a, b]) {
            Err(DiError::CircularModuleImport { cycle }) => {
                let names: Vec<&str> = cycle.iter().map(ModuleId::as_str).collect();
                assert_eq!(names, vec!["a", "b", "a"]);
            }
            other => panic!("expected import cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let a = Module::builder("a").import_id("a").build();
        assert!(matches!(build(&[a]), Err(DiError::CircularModuleImport { .. })));
    }

    #[test]
    fn test_unknown_forward_import() {
        let a = Module::builder("a").import_id("ghost").build();
        match build(&[a]) {
            Err(DiError::UnknownModule { importer, id }) => {
                assert_eq!(importer.as_str(), "a");
                assert_eq!(id.as_str(), "ghost");
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn test_diamond_import_is_not_duplicate() {
        let shared = Module::builder("shared").build();
        let left = Module::builder("left").import(&shared).build();
        let right = Module::builder("right").import(&shared).build();
        let graph = build(&[left, right]).unwrap();
        assert_eq!(graph.modules().len(), 3);

        let impostor = Module::builder("shared").build();
        let other = Module::builder("other").import(&impostor).build();
        let left = Module::builder("left").import(&shared).build();
        assert!(matches!(build(&[left, other]), Err(DiError::DuplicateModule { .. })));
    }

    #[test]
    fn test_visibility_follows_imports() {
        let token = Token::<u8>::new("Hidden");
        let owner = Module::builder("owner")
            .provider(Provider::builder(&token).value(1))
            .unwrap()
            .build();
        let importer = Module::builder("importer").import(&owner).build();
        let stranger = Module::builder("stranger").build();

        let graph = build(&[importer, stranger]).unwrap();
        assert!(graph.is_visible(&"owner".into(), token.erased()));
        assert!(graph.is_visible(&"importer".into(), token.erased()));
        assert!(!graph.is_visible(&"stranger".into(), token.erased()));
        assert_eq!(graph.lookup(None, token.erased()), None);
    }

    #[test]
    fn test_missing_dependency_fails_at_build() {
        let missing = Token::<u8>::new("Missing");
        let needs = Token::<u8>::new("Needs");
        let module = Module::builder("m")
            .provider(Provider::builder(&needs).depends_on(&missing).value(1))
            .unwrap()
            .build();
        assert!(matches!(
            build(&[module]),
            Err(DiError::ProviderNotFound { token: "Missing", scope: Scope::Application })
        ));
    }

    #[test]
    fn test_builtin_dependencies_have_fixed_scopes() {
        let reads_session = Token::<u8>::new("ReadsSession");
        let module = Module::builder("m")
            .provider(
                Provider::builder(&reads_session)
                    .depends_on(&*SESSION)
                    .depends_on(&*MODULE_ID)
                    .value(1),
            )
            .unwrap()
            .build();
        assert!(matches!(build(&[module]), Err(DiError::ScopeViolation { dependency: "SESSION", .. })));
    }

    #[test]
    fn test_builtin_token_cannot_be_provided() {
        let module = Module::builder("m")
            .provider(Provider::builder(&*MODULE_ID).value(ModuleId::from("fake")))
            .unwrap()
            .build();
        assert!(matches!(build(&[module]), Err(DiError::DuplicateProvider { token: "MODULE_ID", .. })));
    }
}
