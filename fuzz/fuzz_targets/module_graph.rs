#![no_main]

use std::sync::Arc;

use ferrous_modules::{ConcatSchemaMerger, DiError, Module, ModuleGraph, Provider, Scope, Token};
use libfuzzer_sys::fuzz_target;

const MAX_MODULES: usize = 8;

fn scope_of(byte: u8) -> Scope {
    match byte % 3 {
        0 => Scope::Application,
        1 => Scope::Session,
        _ => Scope::Operation,
    }
}

// Each module takes three bytes: provider scope, dependency target, forward import.
// Assembly must either succeed or fail with a boot-fatal error, never panic.
fuzz_target!(|data: &[u8]| {
    let count = (data.len() / 3).min(MAX_MODULES);
    if count == 0 {
        return;
    }

    let tokens: Vec<Token<u32>> = (0..count).map(|_| Token::new("Node")).collect();
    let mut modules: Vec<Arc<Module>> = Vec::with_capacity(count);

    for i in 0..count {
        let [scope, dep, import] = [data[i * 3], data[i * 3 + 1], data[i * 3 + 2]];
        let dep = dep as usize % count;
        let import = import as usize % count;

        let mut provider = Provider::builder(&tokens[i]).scope(scope_of(scope));
        if dep != i {
            provider = provider.depends_on(&tokens[dep]);
        }
        if scope & 0x80 != 0 {
            provider = provider.global();
        }

        let mut builder = Module::builder(format!("m{i}"));
        builder = match builder.provider(provider.value(i as u32)) {
            Ok(builder) => builder,
            Err(_) => return,
        };
        if import < i {
            builder = builder.import(&modules[import]);
        } else if import != i {
            builder = builder.import_id(format!("m{import}"));
        }
        modules.push(builder.build());
    }

    match ModuleGraph::build(&modules, &ConcatSchemaMerger) {
        Ok(graph) => assert_eq!(graph.modules().len(), count),
        Err(err) => assert!(
            err.is_boot_fatal()
                || matches!(
                    err,
                    DiError::ProviderNotFound { .. } | DiError::CircularDependency { .. }
                ),
            "unexpected assembly error: {err}"
        ),
    }
});
