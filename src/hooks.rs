//! Lifecycle hooks for external observability collaborators.
//!
//! Hooks fire when an injector is created, when an operation context is
//! built and when an injector is destroyed. Each of those returns an
//! optional [`SpanEnd`] callback, invoked when the traced span completes:
//!
//! - `on_injector`: when the injector is destroyed
//! - `on_context`: when the context is ready or failed to build
//! - `on_destroy`: when every teardown hook has run

use std::sync::Arc;
use std::time::Instant;

use crate::error::TeardownError;
use crate::injector::InjectorId;
use crate::scope::Scope;

/// Callback run when a traced span completes.
pub type SpanEnd = Box<dyn FnOnce() + Send>;

/// Identity of an injector, passed to hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectorInfo {
    pub id: InjectorId,
    pub scope: Scope,
    pub parent: Option<InjectorId>,
}

/// Description of an operation context being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextInfo {
    pub operation_injector: InjectorId,
    pub session_injector: InjectorId,
    /// Whether the session injector outlives the operation
    pub shared_session: bool,
}

/// Observer of injector and context lifecycles.
///
/// All methods default to no-ops. Hooks are called synchronously; keep them
/// cheap.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use ferrous_modules::{InjectorInfo, LifecycleHooks, Scope, SpanEnd};
///
/// #[derive(Default)]
/// struct CountOperations(AtomicUsize);
///
/// impl LifecycleHooks for CountOperations {
///     fn on_injector(&self, info: &InjectorInfo) -> Option<SpanEnd> {
///         if info.scope == Scope::Operation {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///         None
///     }
/// }
/// ```
pub trait LifecycleHooks: Send + Sync {
    fn on_injector(&self, _info: &InjectorInfo) -> Option<SpanEnd> {
        None
    }

    fn on_context(&self, _info: &ContextInfo) -> Option<SpanEnd> {
        None
    }

    fn on_destroy(&self, _info: &InjectorInfo) -> Option<SpanEnd> {
        None
    }

    /// A teardown hook failed or panicked. Never aborts the destroy.
    fn on_teardown_error(&self, _info: &InjectorInfo, _error: &TeardownError) {}
}

/// Pending span ends; they run when the guard is dropped.
#[derive(Default)]
pub(crate) struct SpanGuard {
    ends: Vec<SpanEnd>,
}

impl SpanGuard {
    pub(crate) fn end(self) {}
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        for end in self.ends.drain(..).rev() {
            end();
        }
    }
}

/// Registered hooks, notified in registration order.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    hooks: Vec<Arc<dyn LifecycleHooks>>,
}

impl Hooks {
    pub(crate) fn add(&mut self, hook: Arc<dyn LifecycleHooks>) {
        self.hooks.push(hook);
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    fn collect(&self, start: impl Fn(&dyn LifecycleHooks) -> Option<SpanEnd>) -> SpanGuard {
        SpanGuard {
            ends: self.hooks.iter().filter_map(|hook| start(hook.as_ref())).collect(),
        }
    }

    pub(crate) fn injector(&self, info: &InjectorInfo) -> SpanGuard {
        self.collect(|hook| hook.on_injector(info))
    }

    pub(crate) fn context(&self, info: &ContextInfo) -> SpanGuard {
        self.collect(|hook| hook.on_context(info))
    }

    pub(crate) fn destroy(&self, info: &InjectorInfo) -> SpanGuard {
        self.collect(|hook| hook.on_destroy(info))
    }

    pub(crate) fn teardown_error(&self, info: &InjectorInfo, error: &TeardownError) {
        for hook in &self.hooks {
            hook.on_teardown_error(info, error);
        }
    }
}

/// Hooks that report lifecycles through `tracing`.
///
/// Each injector gets a `debug`-level span that stays open until the
/// injector is destroyed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl LifecycleHooks for TracingHooks {
    fn on_injector(&self, info: &InjectorInfo) -> Option<SpanEnd> {
        let span = tracing::debug_span!(
            "injector",
            id = info.id.get(),
            scope = %info.scope,
            parent = ?info.parent.map(InjectorId::get),
        );
        span.in_scope(|| tracing::debug!("injector created"));
        let start = Instant::now();
        Some(Box::new(move || {
            span.in_scope(|| tracing::debug!(lifetime_ms = elapsed_ms(start), "injector closed"));
        }))
    }

    fn on_context(&self, info: &ContextInfo) -> Option<SpanEnd> {
        let span = tracing::debug_span!(
            "operation_context",
            operation = info.operation_injector.get(),
            session = info.session_injector.get(),
            shared_session = info.shared_session,
        );
        let start = Instant::now();
        Some(Box::new(move || {
            span.in_scope(|| tracing::debug!(build_ms = elapsed_ms(start), "operation context built"));
        }))
    }

    fn on_destroy(&self, info: &InjectorInfo) -> Option<SpanEnd> {
        let id = info.id.get();
        let scope = info.scope;
        let start = Instant::now();
        Some(Box::new(move || {
            tracing::debug!(injector = id, scope = %scope, teardown_ms = elapsed_ms(start), "injector destroyed");
        }))
    }

    fn on_teardown_error(&self, info: &InjectorInfo, error: &TeardownError) {
        tracing::warn!(injector = info.id.get(), scope = %info.scope, token = error.token, "{}", error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl LifecycleHooks for Recorder {
        fn on_destroy(&self, info: &InjectorInfo) -> Option<SpanEnd> {
            let log = self.0.clone();
            log.lock().push(format!("start {}", info.scope));
            let scope = info.scope;
            Some(Box::new(move || log.lock().push(format!("end {scope}"))))
        }
    }

    #[test]
    fn test_span_end_runs_when_guard_ends() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::default();
        hooks.add(Arc::new(Recorder(log.clone())));
        hooks.add(Arc::new(TracingHooks));
        assert_eq!(hooks.len(), 2);

        let info = InjectorInfo {
            id: InjectorId::next(),
            scope: Scope::Session,
            parent: None,
        };
        let guard = hooks.destroy(&info);
        assert_eq!(*log.lock(), vec!["start session"]);
        guard.end();
        assert_eq!(*log.lock(), vec!["start session", "end session"]);

        // default methods are no-ops
        hooks.injector(&info).end();
        assert_eq!(log.lock().len(), 2);
    }
}
