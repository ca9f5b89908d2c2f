//! Explicit resolution path for cycle and depth detection.
//!
//! The path travels with each resolution call instead of living in
//! thread-local storage, so it stays correct when a construction suspends
//! and resumes on another worker thread.

use crate::error::{DiError, DiResult};
use crate::token::AnyToken;

/// Tokens currently being resolved, outermost first.
#[derive(Clone, Default)]
pub(crate) struct ResolutionPath {
    stack: Vec<AnyToken>,
}

impl ResolutionPath {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this path extended by `token`.
    ///
    /// Fails with `CircularDependency` if `token` is already in progress,
    /// and with `DepthExceeded` past `max_depth`.
    pub(crate) fn enter(&self, token: &AnyToken, max_depth: usize) -> DiResult<Self> {
        // Circular detection BEFORE pushing the new token
        if let Some(start) = self.stack.iter().position(|t| t == token) {
            let mut cycle: Vec<&'static str> = self.stack[start..].iter().map(AnyToken::name).collect();
            cycle.push(token.name());
            return Err(DiError::CircularDependency { cycle });
        }

        if self.stack.len() >= max_depth {
            return Err(DiError::DepthExceeded(max_depth));
        }

        let mut stack = Vec::with_capacity(self.stack.len() + 1);
        stack.extend(self.stack.iter().cloned());
        stack.push(token.clone());
        Ok(Self { stack })
    }

    pub(crate) fn len(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    #[test]
    fn test_detects_cycle_with_path() {
        let a = Token::<u8>::new("A");
        let b = Token::<u8>::new("B");

        let path = ResolutionPath::new()
            .enter(a.erased(), 8)
            .and_then(|p| p.enter(b.erased(), 8))
            .unwrap();
        assert_eq!(path.len(), 2);

        match path.enter(a.erased(), 8) {
            Err(DiError::CircularDependency { cycle }) => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("expected cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_depth_guard() {
        let tokens: Vec<_> = (0..3).map(|_| Token::<u8>::new("T")).collect();
        let mut path = ResolutionPath::new();
        for t in &tokens[..2] {
            path = path.enter(t.erased(), 2).unwrap();
        }
        assert!(matches!(path.enter(tokens[2].erased(), 2), Err(DiError::DepthExceeded(2))));
    }
}
