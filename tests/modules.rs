/// Module graph assembly: conflicts, globals, visibility and boot-fatal errors.
use ferrous_modules::{
    Application, ConcatSchemaMerger, DiError, DiResult, MergedSchema, Module, ModuleGraph, Provider, ResolverSource,
    SchemaMerger, Scope, Token, TypeDefsSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn conflicting_provider_names_both_modules() {
    let token = Token::<u32>::new("Limit");
    let a = Module::builder("a")
        .provider(Provider::builder(&token).value(1))
        .unwrap()
        .build();
    let b = Module::builder("b")
        .provider(Provider::builder(&token).value(2))
        .unwrap()
        .build();

    let err = Application::builder().module(a).module(b).build().await.unwrap_err();
    assert!(err.is_boot_fatal());
    match err {
        DiError::ConflictingProvider { token, first, second } => {
            assert_eq!(token, "Limit");
            assert_eq!(first.as_str(), "a");
            assert_eq!(second.as_str(), "b");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn reexported_recipe_is_not_a_conflict() {
    let token = Token::<u32>::new("Shared");
    let provider = Provider::builder(&token).value(5);
    let a = Module::builder("a").provider(provider.clone()).unwrap().build();
    let b = Module::builder("b").provider(provider).unwrap().build();

    let app = Application::builder().module(a).module(b).build().await.unwrap();
    assert_eq!(app.graph().provider_count(), 1);

    let from_a = app.injector().for_module(&"a".into()).unwrap().get(&token).await.unwrap();
    let from_b = app.injector().for_module(&"b".into()).unwrap().get(&token).await.unwrap();
    assert!(Arc::ptr_eq(&from_a, &from_b));
}

#[tokio::test]
async fn global_provider_visible_without_import() {
    let pool = Token::<&'static str>::new("Pool");
    let local = Token::<u8>::new("Local");
    let db = Module::builder("db")
        .provider(Provider::builder(&pool).global().value("pool"))
        .unwrap()
        .provider(Provider::builder(&local).value(1))
        .unwrap()
        .build();
    let users = Module::builder("users").build();

    let app = Application::builder().module(users).module(db).build().await.unwrap();
    let users_view = app.injector().for_module(&"users".into()).unwrap();

    assert_eq!(*users_view.get(&pool).await.unwrap(), "pool");
    assert_eq!(*app.injector().get(&pool).await.unwrap(), "pool");
    assert!(matches!(users_view.get(&local).await, Err(DiError::ProviderNotFound { token: "Local", .. })));
    assert_eq!(app.graph().globals().count(), 1);
}

#[tokio::test]
async fn scope_violation_is_boot_fatal() {
    let request = Token::<u8>::new("Request");
    let cache = Token::<u8>::new("Cache");
    let module = Module::builder("m")
        .provider(Provider::builder(&request).scope(Scope::Operation).value(1))
        .unwrap()
        .provider(Provider::builder(&cache).depends_on(&request).value(2))
        .unwrap()
        .build();

    let err = Application::builder().module(module).build().await.unwrap_err();
    assert!(err.is_boot_fatal());
    assert_eq!(
        err.to_string(),
        "application-scoped `Cache` cannot depend on operation-scoped `Request`"
    );
}

#[tokio::test]
async fn missing_dependency_fails_before_any_factory() {
    let calls = Arc::new(AtomicUsize::new(0));
    let missing = Token::<u8>::new("Missing");
    let needs = Token::<u8>::new("Needs");
    let counter = calls.clone();
    let module = Module::builder("m")
        .provider(Provider::builder(&needs).depends_on(&missing).factory(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        }))
        .unwrap()
        .build();

    let result = Application::builder()
        .module(module)
        .config(ferrous_modules::ApplicationConfig::eager())
        .build()
        .await;
    assert!(matches!(result, Err(DiError::ProviderNotFound { token: "Missing", .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn import_cycle_is_boot_fatal() {
    let a = Module::builder("a").import_id("c").build();
    let b = Module::builder("b").import(&a).build();
    let c = Module::builder("c").import(&b).build();

    let err = ModuleGraph::build(&[c], &ConcatSchemaMerger).unwrap_err();
    assert!(err.is_boot_fatal());
    assert_eq!(err.to_string(), "circular module import: c -> b -> a -> c");
}

#[test]
fn duplicate_module_id_is_rejected() {
    let first = Module::builder("users").build();
    let second = Module::builder("users").build();
    assert!(matches!(
        ModuleGraph::build(&[first.clone(), second], &ConcatSchemaMerger),
        Err(DiError::DuplicateModule { .. })
    ));

    // the same Arc reached twice is one module
    let orders = Module::builder("orders").import(&first).build();
    let graph = ModuleGraph::build(&[first, orders], &ConcatSchemaMerger).unwrap();
    assert_eq!(graph.modules().len(), 2);
}

struct RejectAll;

impl SchemaMerger for RejectAll {
    fn merge(&self, type_defs: &[TypeDefsSource<'_>], _resolvers: &[ResolverSource<'_>]) -> DiResult<MergedSchema> {
        let last = type_defs.last().map(|source| source.module.clone()).unwrap_or_else(|| "none".into());
        Err(DiError::Schema {
            module: last,
            message: "unsupported directive".into(),
        })
    }
}

#[tokio::test]
async fn custom_schema_merger_errors_abort_boot() {
    let module = Module::builder("legacy").type_defs("type Query @old").build();
    let err = Application::builder()
        .module(module)
        .schema_merger(RejectAll)
        .build()
        .await
        .unwrap_err();
    assert!(err.is_boot_fatal());
    assert_eq!(err.to_string(), "schema merge failed in module `legacy`: unsupported directive");
}

#[tokio::test]
async fn schema_is_merged_in_dependency_order() {
    let scalars = Module::builder("scalars").type_defs("scalar DateTime").build();
    let users = Module::builder("users")
        .import(&scalars)
        .type_defs("type User { createdAt: DateTime }")
        .build();

    let app = Application::builder().module(users).build().await.unwrap();
    assert_eq!(
        app.schema().type_defs(),
        "scalar DateTime\n\ntype User { createdAt: DateTime }"
    );
    assert_eq!(
        app.graph().imports_of(&"users".into()).unwrap(),
        vec![&ferrous_modules::ModuleId::from("scalars")]
    );
}
