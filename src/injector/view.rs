//! Module-bound view of an injector.

use std::fmt;
use std::sync::Arc;

use crate::error::DiResult;
use crate::injector::{downcast, Injector};
use crate::internal::ResolutionPath;
use crate::module::ModuleId;
use crate::scope::Scope;
use crate::token::Token;

/// An injector seen through one module's visibility.
///
/// Resolves providers declared by the module, by its transitive imports,
/// and global providers. [`MODULE_ID`](crate::MODULE_ID) resolves to the
/// bound module. Instances are cached by the underlying injector, so two
/// views of the same injector share them.
#[derive(Clone)]
pub struct ModuleInjector {
    injector: Injector,
    module: usize,
    id: ModuleId,
}

impl ModuleInjector {
    pub(crate) fn new(injector: Injector, module: usize, id: ModuleId) -> Self {
        Self { injector, module, id }
    }

    pub async fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> DiResult<Arc<T>> {
        let any = self
            .injector
            .resolve_any(Some(self.module), token.erased(), ResolutionPath::new())
            .await?;
        downcast(any, token)
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.id
    }

    pub fn scope(&self) -> Scope {
        self.injector.scope()
    }

    /// The underlying injector.
    pub fn injector(&self) -> &Injector {
        &self.injector
    }
}

impl fmt::Debug for ModuleInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInjector")
            .field("module", &self.id)
            .field("injector", &self.injector)
            .finish()
    }
}
