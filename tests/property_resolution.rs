/// Property-based tests for module graphs and resolution
///
/// These tests generate module chains and scope combinations and check that
/// visibility, accumulation through imports and scope rules hold regardless
/// of shape.
use ferrous_modules::{
    Application, ConcatSchemaMerger, DiError, Module, ModuleGraph, ModuleId, Provider, Scope, Token,
};
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn scope_strategy() -> impl Strategy<Value = Scope> {
    prop_oneof![Just(Scope::Application), Just(Scope::Session), Just(Scope::Operation)]
}

/// Builds `m0 <- m1 <- ... <- mN`, each providing a running sum of `values`.
fn chain(values: &[u64], close_cycle: bool) -> (Vec<Arc<Module>>, Vec<Token<u64>>) {
    let tokens: Vec<Token<u64>> = values.iter().map(|_| Token::new("Sum")).collect();
    let mut modules: Vec<Arc<Module>> = Vec::new();

    for (i, &value) in values.iter().enumerate() {
        let mut builder = Module::builder(format!("m{i}"));
        let provider = if i == 0 {
            if close_cycle {
                builder = builder.import_id(format!("m{}", values.len() - 1));
            }
            Provider::builder(&tokens[0]).value(value)
        } else {
            builder = builder.import(&modules[i - 1]);
            let prev = tokens[i - 1].clone();
            Provider::builder(&tokens[i])
                .depends_on(&prev)
                .try_factory(move |ctx| ctx.get(&prev).map(|sum| *sum + value))
        };
        modules.push(builder.provider(provider).unwrap().build());
    }
    (modules, tokens)
}

proptest! {
    #[test]
    fn chain_accumulates_through_imports(values in prop::collection::vec(0u64..1000, 1..8)) {
        let (modules, tokens) = chain(&values, false);
        let last = modules.last().unwrap().clone();
        let last_id = last.id().clone();

        let sum = runtime().block_on(async {
            let app = Application::builder().module(last).build().await.unwrap();
            let view = app.injector().for_module(&last_id).unwrap();
            *view.get(tokens.last().unwrap()).await.unwrap()
        });
        prop_assert_eq!(sum, values.iter().sum::<u64>());
    }

    #[test]
    fn earlier_modules_cannot_see_later_ones(values in prop::collection::vec(0u64..1000, 2..8)) {
        let (modules, tokens) = chain(&values, false);
        let graph = ModuleGraph::build(&[modules.last().unwrap().clone()], &ConcatSchemaMerger).unwrap();

        for (i, module) in graph.modules().iter().enumerate() {
            prop_assert_eq!(module.id(), &ModuleId::from(format!("m{i}")));
            for (j, token) in tokens.iter().enumerate() {
                prop_assert_eq!(graph.is_visible(module.id(), token.erased()), j <= i);
            }
        }
    }

    #[test]
    fn closing_the_chain_is_an_import_cycle(values in prop::collection::vec(0u64..1000, 1..8)) {
        let (modules, _) = chain(&values, true);
        let result = ModuleGraph::build(&modules, &ConcatSchemaMerger);
        match result {
            Err(DiError::CircularModuleImport { cycle }) => {
                prop_assert_eq!(cycle.len(), values.len() + 1);
                prop_assert_eq!(cycle.first(), cycle.last());
            }
            other => prop_assert!(false, "expected import cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn scope_rule_is_enforced_at_boot(dependent in scope_strategy(), dependency in scope_strategy()) {
        let upstream = Token::<u8>::new("Upstream");
        let downstream = Token::<u8>::new("Downstream");
        let module = Module::builder("m")
            .provider(Provider::builder(&upstream).scope(dependency).value(1))
            .unwrap()
            .provider(Provider::builder(&downstream).scope(dependent).depends_on(&upstream).value(2))
            .unwrap()
            .build();

        let result = ModuleGraph::build(&[module], &ConcatSchemaMerger);
        if dependency <= dependent {
            prop_assert!(result.is_ok());
        } else {
            let is_violation = matches!(result, Err(DiError::ScopeViolation { .. }));
            prop_assert!(is_violation);
        }
    }
}
