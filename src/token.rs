//! Identity-based tokens for requestable values.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::execution::SessionValue;
use crate::module::ModuleId;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Resolves to the id of the module whose provider is being constructed.
///
/// Available in every scope. Declare it as a dependency to read it from a
/// [`ProviderContext`](crate::ProviderContext), or resolve it from a
/// [`ModuleInjector`](crate::ModuleInjector).
pub static MODULE_ID: Lazy<Token<ModuleId>> = Lazy::new(|| Token::new("MODULE_ID"));

/// Resolves to the raw transport value of the current session.
///
/// Behaves like a session-scoped provider: resolvable from session and
/// operation injectors only.
pub static SESSION: Lazy<Token<SessionValue>> = Lazy::new(|| Token::new("SESSION"));

/// Numeric identity of a token, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

struct TokenInfo {
    id: TokenId,
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
}

/// Type-erased token used in dependency lists and diagnostics.
///
/// Equality and hashing use the token's identity only; the display name is
/// never compared.
#[derive(Clone)]
pub struct AnyToken {
    info: Arc<TokenInfo>,
}

impl AnyToken {
    /// Process-unique identity.
    #[inline]
    pub fn id(&self) -> TokenId {
        self.info.id
    }

    /// Display name given at creation.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.info.name
    }

    /// `TypeId` of the value this token resolves to.
    pub fn value_type_id(&self) -> TypeId {
        self.info.type_id
    }

    /// Type name of the value this token resolves to.
    pub fn value_type_name(&self) -> &'static str {
        self.info.type_name
    }
}

impl PartialEq for AnyToken {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl Eq for AnyToken {}

impl Hash for AnyToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.id.hash(state);
    }
}

impl fmt::Debug for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.info.name, self.info.id.0)
    }
}

impl fmt::Display for AnyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info.name)
    }
}

/// Typed token identifying a provider or configuration value of type `T`.
///
/// Every call to [`Token::new`] creates a new identity: two tokens with the
/// same name are distinct. Clones share identity.
///
/// # Examples
///
/// ```rust
/// use ferrous_modules::Token;
///
/// struct Database;
///
/// let a = Token::<Database>::new("Database");
/// let b = Token::<Database>::new("Database");
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// assert_eq!(a.name(), "Database");
/// ```
pub struct Token<T> {
    erased: AnyToken,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Token<T> {
    /// Creates a token with a fresh identity.
    pub fn new(name: &'static str) -> Self {
        let id = TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            erased: AnyToken {
                info: Arc::new(TokenInfo {
                    id,
                    name,
                    type_id: TypeId::of::<T>(),
                    type_name: type_name::<T>(),
                }),
            },
            _marker: PhantomData,
        }
    }
}

impl<T> Token<T> {
    /// Type-erased view of this token.
    #[inline]
    pub fn erased(&self) -> &AnyToken {
        &self.erased
    }

    /// Process-unique identity.
    #[inline]
    pub fn id(&self) -> TokenId {
        self.erased.id()
    }

    /// Display name given at creation.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.erased.name()
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.erased == other.erased
    }
}

impl<T> Eq for Token<T> {}

impl<T> PartialEq<AnyToken> for Token<T> {
    fn eq(&self, other: &AnyToken) -> bool {
        &self.erased == other
    }
}

impl<T> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.erased.hash(state);
    }
}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.erased, f)
    }
}

impl<T> From<&Token<T>> for AnyToken {
    fn from(token: &Token<T>) -> Self {
        token.erased.clone()
    }
}
