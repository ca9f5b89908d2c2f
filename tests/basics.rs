/// Basic resolution through modules, scopes and built-in tokens.
use ferrous_modules::{
    Application, BoxError, DiError, Module, OperationOptions, Provider, ProviderContext, Scope, SessionValue, Token,
    MODULE_ID, SESSION,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Config {
    url: String,
}

#[derive(Debug)]
struct Database {
    url: String,
}

#[derive(Debug)]
struct RequestInfo {
    path: String,
    module: String,
}

#[tokio::test]
async fn resolves_dependencies_across_imports() {
    let config = Token::<Config>::new("Config");
    let database = Token::<Database>::new("Database");

    let core = Module::builder("core")
        .provider(Provider::builder(&config).value(Config { url: "postgres://db".into() }))
        .unwrap()
        .build();

    let config_dep = config.clone();
    let data = Module::builder("data")
        .import(&core)
        .provider(
            Provider::builder(&database)
                .depends_on(&config)
                .try_factory(move |ctx| Ok::<_, DiError>(Database { url: ctx.get(&config_dep)?.url.clone() })),
        )
        .unwrap()
        .build();

    let app = Application::builder().module(data).build().await.unwrap();
    let view = app.injector().for_module(&"data".into()).unwrap();

    let db = view.get(&database).await.unwrap();
    assert_eq!(db.url, "postgres://db");
    assert!(Arc::ptr_eq(&db, &view.get(&database).await.unwrap()));

    // not global, so invisible through the plain injector
    assert!(matches!(
        app.injector().get(&database).await,
        Err(DiError::ProviderNotFound { token: "Database", scope: Scope::Application })
    ));
}

#[tokio::test]
async fn builtin_tokens_resolve_per_module_and_session() {
    let info = Token::<RequestInfo>::new("RequestInfo");
    let module = Module::builder("requests")
        .provider(
            Provider::builder(&info)
                .scope(Scope::Operation)
                .depends_on(&*SESSION)
                .depends_on(&*MODULE_ID)
                .try_factory(|ctx: &ProviderContext| {
                    let session = ctx.get(&*SESSION)?;
                    let path = session
                        .downcast_ref::<&'static str>()
                        .ok_or("session is not a path")?;
                    Ok::<_, BoxError>(RequestInfo {
                        path: path.to_string(),
                        module: ctx.get(&*MODULE_ID)?.to_string(),
                    })
                }),
        )
        .unwrap()
        .build();

    let app = Application::builder().module(module).build().await.unwrap();
    let operation = app
        .create_operation(SessionValue::new("/graphql"), OperationOptions::auto_destroy())
        .await
        .unwrap();

    let view = operation.context().injector_for(&"requests".into()).unwrap();
    let request = view.get(&info).await.unwrap();
    assert_eq!(request.path, "/graphql");
    assert_eq!(request.module, "requests");
    assert_eq!(view.get(&*MODULE_ID).await.unwrap().as_str(), "requests");
    assert!(view.get(&*SESSION).await.unwrap().downcast_ref::<&'static str>().is_some());
    operation.destroy();
}

#[tokio::test]
async fn async_factories_and_retained_context() {
    let slow = Token::<u64>::new("Slow");
    let module = Module::builder("m")
        .provider(
            Provider::builder(&slow)
                .global()
                .scope(Scope::Session)
                .async_factory(|_ctx: &ProviderContext| async {
                    tokio::task::yield_now().await;
                    Ok::<_, BoxError>(42u64)
                }),
        )
        .unwrap()
        .build();
    let app = Application::builder().module(module).build().await.unwrap();

    let operation = app
        .create_operation(SessionValue::new(()), OperationOptions::default())
        .await
        .unwrap();
    let context = operation.context().clone();
    assert_eq!(*context.injector().get(&slow).await.unwrap(), 42);

    operation.destroy();
    assert!(operation.is_destroyed());
    assert!(matches!(
        context.injector().get(&slow).await,
        Err(DiError::InjectorDestroyed { scope: Scope::Operation })
    ));
}

#[tokio::test]
async fn eager_policy_constructs_at_boot() {
    let built = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let token = Token::<()>::new("Eager");
    let counter = built.clone();
    let module = Module::builder("m")
        .provider(Provider::builder(&token).factory(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }))
        .unwrap()
        .build();

    let lazy = Application::builder().module(module.clone()).build().await.unwrap();
    assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 0);
    drop(lazy);

    let eager = Application::builder()
        .module(module)
        .config(ferrous_modules::ApplicationConfig::eager())
        .build()
        .await
        .unwrap();
    assert_eq!(built.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(eager.injector().is_cached(&token));
}

#[tokio::test]
async fn eager_boot_failure_aborts() {
    let token = Token::<u8>::new("Broken");
    let module = Module::builder("m")
        .provider(Provider::builder(&token).try_factory(|_| Err::<u8, _>("no database")))
        .unwrap()
        .build();

    let result = Application::builder()
        .module(module)
        .config(ferrous_modules::ApplicationConfig::eager())
        .build()
        .await;
    match result {
        Err(DiError::FactoryFailed { token, source }) => {
            assert_eq!(token, "Broken");
            assert_eq!(source.to_string(), "no database");
        }
        other => panic!("expected factory failure, got {:?}", other.err()),
    }
}
