//! Lexical scope tracking for a single extraction pass.
//!
//! Scopes live in an arena and refer to their parent by [`ScopeId`], so symbol
//! records can point at a scope without borrowing it. The tracker keeps a
//! separate stack of the scopes that are currently open.

use serde::{Deserialize, Serialize};

use crate::types::ScopeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The file-level scope every tracker starts with.
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub start_byte: usize,
    /// `None` extends to the end of the file.
    pub end_byte: Option<usize>,
}

impl Scope {
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start_byte && self.end_byte.is_none_or(|end| pos <= end)
    }
}

#[derive(Debug)]
pub struct ScopeTracker {
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                name: "global".to_string(),
                parent: None,
                start_byte: 0,
                end_byte: None,
            }],
            stack: vec![ScopeId::GLOBAL],
        }
    }

    /// Open a child of the current scope and make it current.
    ///
    /// The range is clamped into the parent's range so nesting always holds.
    pub fn push_scope(
        &mut self,
        kind: ScopeKind,
        name: impl Into<String>,
        start_byte: usize,
        end_byte: usize,
    ) -> ScopeId {
        let parent_id = self.current_scope();
        let parent = &self.scopes[parent_id.index()];

        let start = start_byte.max(parent.start_byte);
        let end = match parent.end_byte {
            Some(parent_end) => end_byte.min(parent_end),
            None => end_byte,
        };

        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            name: name.into(),
            parent: Some(parent_id),
            start_byte: start,
            end_byte: Some(end.max(start)),
        });
        self.stack.push(id);
        id
    }

    /// Close the current scope. The global scope is never popped.
    pub fn pop_scope(&mut self) -> Option<ScopeId> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    pub fn current_scope(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::GLOBAL)
    }

    /// Innermost open scope containing `pos`, searched from the most recently
    /// pushed scope down to the root.
    pub fn scope_at_position(&self, pos: usize) -> ScopeId {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|id| self.scopes[id.index()].contains(pos))
            .unwrap_or(ScopeId::GLOBAL)
    }

    /// Whether `pos` lies inside `scope`. Unknown ids are never in scope.
    pub fn is_in_scope(&self, pos: usize, scope: ScopeId) -> bool {
        self.scope(scope).is_some_and(|s| s.contains(pos))
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    /// Number of open scopes, the global scope included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Walk from `id` up to the root, `id` first.
    pub fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(id), |current| {
            self.scopes.get(current.index()).and_then(|s| s.parent)
        })
    }

    /// Hand every scope ever opened to the symbol table.
    pub fn into_scopes(self) -> Vec<Scope> {
        self.scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> (ScopeTracker, ScopeId, ScopeId) {
        let mut tracker = ScopeTracker::new();
        let outer = tracker.push_scope(ScopeKind::Function, "outer", 10, 100);
        let inner = tracker.push_scope(ScopeKind::Block, "inner", 30, 70);
        (tracker, outer, inner)
    }

    #[test]
    fn test_scope_at_position_prefers_innermost() {
        let (tracker, outer, inner) = nested();

        assert_eq!(tracker.scope_at_position(5), ScopeId::GLOBAL);
        assert_eq!(tracker.scope_at_position(15), outer);
        assert_eq!(tracker.scope_at_position(40), inner);
        assert_eq!(tracker.scope_at_position(80), outer);
        assert_eq!(tracker.scope_at_position(105), ScopeId::GLOBAL);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let (tracker, outer, inner) = nested();
        assert_eq!(tracker.scope_at_position(10), outer);
        assert_eq!(tracker.scope_at_position(30), inner);
        assert_eq!(tracker.scope_at_position(70), inner);
        assert_eq!(tracker.scope_at_position(100), outer);
    }

    #[test]
    fn test_global_scope_is_never_popped() {
        let mut tracker = ScopeTracker::new();
        assert_eq!(tracker.pop_scope(), None);
        assert_eq!(tracker.current_scope(), ScopeId::GLOBAL);

        let f = tracker.push_scope(ScopeKind::Function, "f", 0, 10);
        assert_eq!(tracker.current_scope(), f);
        assert_eq!(tracker.pop_scope(), Some(f));
        assert_eq!(tracker.pop_scope(), None);
        assert_eq!(tracker.depth(), 1);
    }

    #[test]
    fn test_popped_scope_no_longer_matches_positions() {
        let (mut tracker, outer, _inner) = nested();
        tracker.pop_scope();
        assert_eq!(tracker.scope_at_position(40), outer);
    }

    #[test]
    fn test_child_range_is_clamped_into_parent() {
        let mut tracker = ScopeTracker::new();
        let outer = tracker.push_scope(ScopeKind::Class, "C", 10, 50);
        let child = tracker.push_scope(ScopeKind::Method, "m", 5, 80);

        let child_scope = tracker.scope(child).unwrap();
        assert_eq!(child_scope.start_byte, 10);
        assert_eq!(child_scope.end_byte, Some(50));
        assert_eq!(child_scope.parent, Some(outer));
    }

    #[test]
    fn test_is_in_scope_and_ancestors() {
        let (tracker, outer, inner) = nested();
        assert!(tracker.is_in_scope(50, inner));
        assert!(!tracker.is_in_scope(80, inner));
        assert!(tracker.is_in_scope(1_000_000, ScopeId::GLOBAL));

        let chain: Vec<_> = tracker.ancestors(inner).collect();
        assert_eq!(chain, vec![inner, outer, ScopeId::GLOBAL]);
    }
}
