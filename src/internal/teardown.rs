//! Internal teardown bag for cached instances.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::TeardownError;
use crate::provider::{AnyArc, ErasedTeardown};
use crate::scope::Scope;

struct TeardownEntry {
    token: &'static str,
    instance: AnyArc,
    hook: ErasedTeardown,
}

/// Teardown hooks of one injector, in construction order.
#[derive(Default)]
pub(crate) struct TeardownBag {
    entries: Vec<TeardownEntry>,
}

impl TeardownBag {
    pub(crate) fn push(&mut self, token: &'static str, instance: AnyArc, hook: ErasedTeardown) {
        self.entries.push(TeardownEntry { token, instance, hook });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Runs every hook in reverse construction order (LIFO).
    ///
    /// Each hook is attempted even if an earlier one failed or panicked.
    pub(crate) fn run_all_reverse(self, scope: Scope) -> Vec<TeardownError> {
        let mut failures = Vec::new();
        for entry in self.entries.into_iter().rev() {
            if let Some(err) = run_one(scope, entry.token, &entry.instance, &entry.hook) {
                failures.push(err);
            }
        }
        failures
    }
}

/// Runs a single hook, converting errors and panics into a `TeardownError`.
pub(crate) fn run_one(
    scope: Scope,
    token: &'static str,
    instance: &AnyArc,
    hook: &ErasedTeardown,
) -> Option<TeardownError> {
    match catch_unwind(AssertUnwindSafe(|| hook(instance))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(TeardownError {
            token,
            scope,
            message: err.to_string(),
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&'static str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "teardown hook panicked".to_string());
            Some(TeardownError { token, scope, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording(order: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> ErasedTeardown {
        let order = order.clone();
        Arc::new(move |_: &AnyArc| {
            order.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_lifo_and_failures_do_not_stop_others() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bag = TeardownBag::default();
        bag.push("first", Arc::new(1u8), recording(&order, "first"));
        bag.push("failing", Arc::new(2u8), Arc::new(|_: &AnyArc| Err("boom".into())));
        bag.push("panicking", Arc::new(3u8), Arc::new(|_: &AnyArc| panic!("kaboom")));
        bag.push("last", Arc::new(4u8), recording(&order, "last"));
        assert_eq!(bag.len(), 4);

        let failures = bag.run_all_reverse(Scope::Operation);

        assert_eq!(*order.lock().unwrap(), vec!["last", "first"]);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].token, "panicking");
        assert_eq!(failures[0].message, "kaboom");
        assert_eq!(failures[1].token, "failing");
        assert_eq!(failures[1].message, "boom");
    }
}
