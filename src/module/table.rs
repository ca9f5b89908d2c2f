//! Per-module provider table.

use std::collections::HashMap;

use crate::error::{DiError, DiResult};
use crate::module::ModuleId;
use crate::provider::Provider;
use crate::token::{AnyToken, TokenId};

/// Providers declared by one module, in registration order.
#[derive(Default, Clone)]
pub(crate) struct ProviderTable {
    entries: Vec<Provider>,
    index: HashMap<TokenId, usize>,
}

impl ProviderTable {
    /// Registers a recipe.
    ///
    /// Returns `Ok(false)` when the identical recipe is already present and
    /// `DuplicateProvider` when the token is taken by a different recipe.
    pub(crate) fn register(&mut self, provider: Provider, module: &ModuleId) -> DiResult<bool> {
        if let Some(&pos) = self.index.get(&provider.token.id()) {
            if self.entries[pos].same_recipe(&provider) {
                return Ok(false);
            }
            return Err(DiError::DuplicateProvider {
                token: provider.token.name(),
                module: module.clone(),
            });
        }
        self.index.insert(provider.token.id(), self.entries.len());
        self.entries.push(provider);
        Ok(true)
    }

    pub(crate) fn get(&self, token: &AnyToken) -> Option<&Provider> {
        self.index.get(&token.id()).map(|&pos| &self.entries[pos])
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
