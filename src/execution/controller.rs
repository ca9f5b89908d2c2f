//! Controllers owning session and operation injectors.

use std::future::Future;

use crate::error::{DiResult, TeardownError};
use crate::execution::{Application, OperationContext, SessionValue};
use crate::injector::Injector;

/// Options for [`Application::create_operation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// Destroy on drop without warning
    pub auto_destroy: bool,
}

impl OperationOptions {
    pub fn auto_destroy() -> Self {
        Self { auto_destroy: true }
    }
}

/// Owner of a reusable session injector.
///
/// Dropping the controller ends the session and destroys its injector.
pub struct SessionController {
    app: Application,
    injector: Injector,
    session: SessionValue,
}

impl SessionController {
    pub(crate) fn new(app: Application, injector: Injector, session: SessionValue) -> Self {
        Self { app, injector, session }
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn session(&self) -> &SessionValue {
        &self.session
    }

    /// Starts an operation sharing this session injector.
    pub async fn create_operation(&self, options: OperationOptions) -> DiResult<OperationController> {
        self.app
            .build_operation(self.injector.clone(), self.session.clone(), false, options)
            .await
    }

    /// Destroys the session injector. Idempotent.
    pub fn destroy(&self) -> Vec<TeardownError> {
        self.injector.destroy()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.injector.destroy();
    }
}

/// Owner of one operation's injector.
///
/// The operation injector is destroyed exactly once: by [`destroy`](Self::destroy),
/// by [`run`](Self::run) when the unit of work completes, or when the
/// controller is dropped (including when the task holding it is cancelled).
/// Dropping an undestroyed controller created without
/// [`OperationOptions::auto_destroy`] logs a warning.
pub struct OperationController {
    context: OperationContext,
    injector: Injector,
    private_session: Option<Injector>,
    options: OperationOptions,
    warn_on_undestroyed: bool,
}

impl OperationController {
    pub(crate) fn new(
        context: OperationContext,
        injector: Injector,
        private_session: Option<Injector>,
        options: OperationOptions,
        warn_on_undestroyed: bool,
    ) -> Self {
        Self {
            context,
            injector,
            private_session,
            options,
            warn_on_undestroyed,
        }
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// The operation injector.
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn is_destroyed(&self) -> bool {
        self.injector.is_destroyed()
    }

    /// Destroys the operation injector, then the private session injector
    /// if this operation owns one. Idempotent.
    pub fn destroy(&self) -> Vec<TeardownError> {
        let mut failures = self.injector.destroy();
        if let Some(session) = &self.private_session {
            failures.extend(session.destroy());
        }
        failures
    }

    /// Runs one unit of work with the operation context, then destroys the
    /// operation whether the work succeeded or not.
    ///
    /// If the returned future is dropped before completion, the controller
    /// is dropped with it and the operation is destroyed.
    pub async fn run<F, Fut, R>(self, work: F) -> R
    where
        F: FnOnce(OperationContext) -> Fut,
        Fut: Future<Output = R>,
    {
        let result = work(self.context.clone()).await;
        self.destroy();
        result
    }
}

impl Drop for OperationController {
    fn drop(&mut self) {
        if self.is_destroyed() {
            // private session may still be alive if only the injector was destroyed externally
            if let Some(session) = &self.private_session {
                session.destroy();
            }
            return;
        }
        if !self.options.auto_destroy && self.warn_on_undestroyed {
            tracing::warn!(
                injector = self.injector.id().get(),
                "operation controller dropped without destroy; destroying now"
            );
        }
        self.destroy();
    }
}
