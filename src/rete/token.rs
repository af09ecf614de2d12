//! Partial matches.
//!
//! A token records one WME (or none, for nodes that only filter) and a link
//! to its parent token, so a chain of tokens spells out the WMEs matched by a
//! prefix of a production's positive conditions. Tokens are kept in a flat
//! store keyed by [`TokenId`]; ids are never reused.

use std::collections::HashMap;

use indexmap::IndexSet;
use petgraph::stable_graph::NodeIndex;

use crate::error::{HekaResult, InvariantViolation};
use crate::memory::Timetag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

#[derive(Debug)]
pub struct Token {
    pub node: NodeIndex,
    pub parent: Option<TokenId>,
    pub wme: Option<Timetag>,
    pub children: IndexSet<TokenId>,
    /// Negative node tokens: WMEs currently matching the negated pattern.
    pub blockers: IndexSet<Timetag>,
    /// Conjunctive negation tokens: subnetwork results that block this one.
    pub ncc_results: IndexSet<TokenId>,
    /// Partner result tokens: the conjunctive negation token they block, once
    /// it exists.
    pub ncc_owner: Option<TokenId>,
    /// Partner result tokens: the token above the conjunctive negation node
    /// this result was derived from.
    pub ncc_parent: Option<TokenId>,
}

#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: HashMap<TokenId, Token>,
    next: u64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a token and link it under its parent.
    pub fn create(&mut self, node: NodeIndex, parent: Option<TokenId>, wme: Option<Timetag>) -> TokenId {
        self.next += 1;
        let id = TokenId(self.next);
        self.tokens.insert(
            id,
            Token {
                node,
                parent,
                wme,
                children: IndexSet::new(),
                blockers: IndexSet::new(),
                ncc_results: IndexSet::new(),
                ncc_owner: None,
                ncc_parent: None,
            },
        );
        if let Some(p) = parent.and_then(|p| self.tokens.get_mut(&p)) {
            p.children.insert(id);
        }
        id
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.get_mut(&id)
    }

    pub fn expect(&self, id: TokenId) -> HekaResult<&Token> {
        self.tokens
            .get(&id)
            .ok_or_else(|| InvariantViolation::UnknownToken { token: id.0 }.into())
    }

    pub fn expect_mut(&mut self, id: TokenId) -> HekaResult<&mut Token> {
        self.tokens
            .get_mut(&id)
            .ok_or_else(|| InvariantViolation::UnknownToken { token: id.0 }.into())
    }

    /// Unlink a token from its parent and drop it. Children must already be
    /// gone.
    pub fn remove(&mut self, id: TokenId) -> Option<Token> {
        let token = self.tokens.remove(&id)?;
        if let Some(p) = token.parent.and_then(|p| self.tokens.get_mut(&p)) {
            p.children.shift_remove(&id);
        }
        Some(token)
    }

    pub fn contains(&self, id: TokenId) -> bool {
        self.tokens.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The WME `levels_up` WME-carrying tokens above `from`, counting `from`
    /// itself as level zero when it carries one.
    pub fn nth_wme(&self, from: TokenId, levels_up: usize) -> HekaResult<Timetag> {
        let mut remaining = levels_up;
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let token = self.expect(id)?;
            if let Some(tt) = token.wme {
                if remaining == 0 {
                    return Ok(tt);
                }
                remaining -= 1;
            }
            cursor = token.parent;
        }
        Err(InvariantViolation::UnknownToken { token: from.0 }.into())
    }

    /// The WMEs along the chain ending at `from`, oldest first.
    pub fn wme_chain(&self, from: TokenId) -> HekaResult<Vec<Timetag>> {
        let mut out = Vec::new();
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let token = self.expect(id)?;
            out.extend(token.wme);
            cursor = token.parent;
        }
        out.reverse();
        Ok(out)
    }

    /// Walk up from `from` to the first token that belongs to `node`.
    pub fn ancestor_at(&self, from: TokenId, node: NodeIndex) -> HekaResult<TokenId> {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let token = self.expect(id)?;
            if token.node == node {
                return Ok(id);
            }
            cursor = token.parent;
        }
        Err(InvariantViolation::UnknownNode { node: node.index() }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_skip_wmeless_tokens() {
        let mut store = TokenStore::new();
        let root = store.create(NodeIndex::new(0), None, None);
        let a = store.create(NodeIndex::new(1), Some(root), Some(Timetag(10)));
        let filter = store.create(NodeIndex::new(2), Some(a), None);
        let b = store.create(NodeIndex::new(3), Some(filter), Some(Timetag(20)));

        assert_eq!(store.wme_chain(b).unwrap(), vec![Timetag(10), Timetag(20)]);
        assert_eq!(store.nth_wme(b, 0).unwrap(), Timetag(20));
        assert_eq!(store.nth_wme(b, 1).unwrap(), Timetag(10));
        assert_eq!(store.nth_wme(filter, 0).unwrap(), Timetag(10));
        assert!(store.nth_wme(b, 2).is_err());
        assert_eq!(store.ancestor_at(b, NodeIndex::new(1)).unwrap(), a);
    }

    #[test]
    fn remove_unlinks_from_parent() {
        let mut store = TokenStore::new();
        let root = store.create(NodeIndex::new(0), None, None);
        let child = store.create(NodeIndex::new(1), Some(root), Some(Timetag(1)));
        assert!(store.get(root).unwrap().children.contains(&child));
        store.remove(child);
        assert!(store.get(root).unwrap().children.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut store = TokenStore::new();
        let a = store.create(NodeIndex::new(0), None, None);
        store.remove(a);
        let b = store.create(NodeIndex::new(0), None, None);
        assert_ne!(a, b);
    }
}
