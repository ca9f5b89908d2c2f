//! Walks one application through boot, two requests and shutdown.
//!
//! Run with `RUST_LOG=debug cargo run --example request_lifecycle` to see
//! the lifecycle spans.

use ferrous_modules::{
    Application, ApplicationConfig, BoxError, DiResult, Dispose, Module, OperationOptions, Provider, ResolverCall,
    Scope, SessionValue, Token, TracingHooks,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ===== Domain Types =====

#[derive(Debug)]
struct Request {
    path: &'static str,
    user_id: &'static str,
}

#[derive(Clone)]
struct UserStore {
    users: HashMap<&'static str, &'static str>,
}

struct Transaction {
    id: u64,
}

impl Dispose for Transaction {
    fn dispose(&self) -> Result<(), BoxError> {
        tracing::info!(transaction = self.id, "transaction closed");
        Ok(())
    }
}

struct CurrentUser {
    name: Option<&'static str>,
}

// ===== Modules =====

fn build_modules(store: &Token<UserStore>, tx: &Token<Transaction>, user: &Token<CurrentUser>) -> DiResult<Vec<Arc<Module>>> {
    let next_tx = Arc::new(AtomicU64::new(1));

    let storage = Module::builder("storage")
        .provider(Provider::builder(store).global().value(UserStore {
            users: HashMap::from([("1", "Ada"), ("2", "Grace")]),
        }))?
        .provider(
            Provider::builder(tx)
                .global()
                .scope(Scope::Operation)
                .disposable()
                .factory(move |_| Transaction {
                    id: next_tx.fetch_add(1, Ordering::Relaxed),
                }),
        )?
        .build();

    let store_dep = store.clone();
    let user_token = user.clone();
    let users = Module::builder("users")
        .import(&storage)
        .type_defs("type Query { me: String }")
        .provider(
            Provider::builder(user)
                .scope(Scope::Session)
                .depends_on(store)
                .depends_on(&*ferrous_modules::SESSION)
                .try_factory(move |ctx| {
                    let store = ctx.get(&store_dep)?;
                    let session = ctx.get(&*ferrous_modules::SESSION)?;
                    let request = session.downcast_ref::<Request>().ok_or("session is not a request")?;
                    Ok::<_, BoxError>(CurrentUser {
                        name: store.users.get(request.user_id).copied(),
                    })
                }),
        )?
        .context("path", |session: SessionValue| async move {
            Ok::<_, BoxError>(session.downcast_ref::<Request>().map(|r| r.path).unwrap_or("/"))
        })
        .resolver("Query", "me", move |call: ResolverCall<'_>| {
            let user_token = user_token.clone();
            Box::pin(async move {
                let user = call.injector.get(&user_token).await?;
                Ok(json!(user.name))
            })
        })
        .build();

    Ok(vec![users])
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = Token::<UserStore>::new("UserStore");
    let tx = Token::<Transaction>::new("Transaction");
    let user = Token::<CurrentUser>::new("CurrentUser");

    let app = Application::builder()
        .modules(build_modules(&store, &tx, &user)?)
        .config(ApplicationConfig::eager())
        .hooks(TracingHooks)
        .build()
        .await?;
    println!("schema:\n{}", app.schema().type_defs());

    for request in [Request { path: "/graphql", user_id: "1" }, Request { path: "/graphql", user_id: "9" }] {
        let operation = app
            .create_operation(SessionValue::new(request), OperationOptions::auto_destroy())
            .await?;
        let app = &app;
        let tx = tx.clone();

        let me = operation
            .run(|ctx| async move {
                let transaction = ctx.injector().get(&tx).await?;
                let path = ctx.extension::<&'static str>("path");
                println!("transaction {} for {:?}", transaction.id, path.as_deref());
                app.execute_resolver("Query", "me", &ctx, &Value::Null, &Value::Null).await
            })
            .await?;
        println!("me = {me}");
    }

    let failures = app.shutdown();
    println!("shutdown with {} teardown failures", failures.len());
    Ok(())
}
