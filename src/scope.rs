//! Scope tiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifetime tier of a provider and of the injector that caches it.
///
/// Scopes are ordered from broadest to narrowest, so `Application <
/// Session < Operation`. A provider may depend directly only on providers of
/// its own scope or a broader one.
///
/// # Examples
///
/// ```rust
/// use ferrous_modules::Scope;
///
/// assert!(Scope::Application < Scope::Operation);
/// assert!(Scope::Session.can_depend_on(Scope::Application));
/// assert!(!Scope::Application.can_depend_on(Scope::Session));
/// assert_eq!(Scope::Operation.parent(), Some(Scope::Session));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One instance for the process lifetime
    Application,
    /// One instance per external request or connection
    Session,
    /// One instance per unit of work inside a session
    Operation,
}

impl Scope {
    /// Whether a provider of this scope may depend directly on one of `dependency`.
    #[inline]
    pub fn can_depend_on(self, dependency: Scope) -> bool {
        dependency <= self
    }

    /// The enclosing scope, `None` for `Application`.
    pub fn parent(self) -> Option<Scope> {
        match self {
            Scope::Application => None,
            Scope::Session => Some(Scope::Application),
            Scope::Operation => Some(Scope::Session),
        }
    }

    /// Lower-case name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Application => "application",
            Scope::Session => "session",
            Scope::Operation => "operation",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
