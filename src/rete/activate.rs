//! Token propagation: WME arrival and departure, left and right activation,
//! and cascading token deletion.

use petgraph::stable_graph::NodeIndex;

use crate::error::{HekaResult, InvariantViolation};
use crate::memory::{Timetag, Wme};
use crate::symbol::SymbolTable;

use super::node::{JoinTest, NodeKind, Source, relation_holds};
use super::token::TokenId;
use super::{Rete, WmeEntry};

impl Rete {
    /// Add a WME and propagate it through the network.
    pub fn add_wme(&mut self, w: Wme, symbols: &SymbolTable) -> HekaResult<()> {
        if self.wmes.contains_key(&w.timetag) {
            return Err(InvariantViolation::DuplicateTimetag { timetag: w.timetag.0 }.into());
        }
        let alphas = self.alpha.memories_for(&w);
        for &a in &alphas {
            if let Some(mem) = self.alpha.get_mut(a) {
                mem.wmes.insert(w.timetag);
            }
        }
        self.wmes.insert(
            w.timetag,
            WmeEntry {
                wme: w,
                alphas: alphas.clone(),
                tokens: Default::default(),
                blocking: Default::default(),
            },
        );
        for a in alphas {
            let successors = self.alpha.get(a).map(|m| m.successors.clone()).unwrap_or_default();
            for node in successors {
                self.right_activate(node, w, symbols)?;
            }
        }
        Ok(())
    }

    /// Remove a WME. Every token built on it goes, and negative tokens it
    /// blocked are released. Unknown timetags are ignored.
    pub fn remove_wme(&mut self, timetag: Timetag, symbols: &SymbolTable) -> HekaResult<()> {
        let Some(entry) = self.wmes.get(&timetag) else {
            return Ok(());
        };
        let alphas = entry.alphas.clone();
        let doomed: Vec<TokenId> = entry.tokens.iter().copied().collect();
        for a in alphas {
            if let Some(mem) = self.alpha.get_mut(a) {
                mem.wmes.shift_remove(&timetag);
            }
        }
        for t in doomed {
            if self.tokens.contains(t) {
                self.delete_token(t, symbols)?;
            }
        }

        let blocked: Vec<TokenId> = self
            .wmes
            .get(&timetag)
            .map(|e| e.blocking.iter().copied().collect())
            .unwrap_or_default();
        for t in blocked {
            let Some(token) = self.tokens.get_mut(t) else {
                continue;
            };
            token.blockers.shift_remove(&timetag);
            if token.blockers.is_empty() {
                let node = token.node;
                for child in self.children_of(node) {
                    self.left_activate(child, t, None, symbols)?;
                }
            }
        }
        self.wmes.remove(&timetag);
        Ok(())
    }

    /// A new WME reached a join or negative node from its alpha memory.
    pub(super) fn right_activate(&mut self, node: NodeIndex, w: Wme, symbols: &SymbolTable) -> HekaResult<()> {
        match self.node(node)?.kind.clone() {
            NodeKind::Join { tests, .. } => {
                let Some(parent) = self.parent_of(node) else {
                    return Err(InvariantViolation::UnknownNode { node: node.index() }.into());
                };
                let candidates = self.active_tokens(parent)?;
                let children = self.children_of(node);
                for t in candidates {
                    if self.passes(&tests, t, &w, symbols)? {
                        for &child in &children {
                            self.left_activate(child, t, Some(w.timetag), symbols)?;
                        }
                    }
                }
            }
            NodeKind::Negative { tests, .. } => {
                let held: Vec<TokenId> = self.node(node)?.tokens.iter().copied().collect();
                for t in held {
                    if !self.passes(&tests, t, &w, symbols)? {
                        continue;
                    }
                    let token = self.tokens.expect_mut(t)?;
                    let was_free = token.blockers.is_empty();
                    token.blockers.insert(w.timetag);
                    if let Some(entry) = self.wmes.get_mut(&w.timetag) {
                        entry.blocking.insert(t);
                    }
                    if was_free {
                        self.delete_children(t, symbols)?;
                    }
                }
            }
            _ => return Err(InvariantViolation::UnknownNode { node: node.index() }.into()),
        }
        Ok(())
    }

    /// Deliver a partial match to `node`. `parent` is a token of the nearest
    /// token-holding ancestor and `wme` the WME matched by the join in
    /// between, if any.
    pub(super) fn left_activate(
        &mut self,
        node: NodeIndex,
        parent: TokenId,
        wme: Option<Timetag>,
        symbols: &SymbolTable,
    ) -> HekaResult<()> {
        match self.node(node)?.kind.clone() {
            NodeKind::Root => Err(InvariantViolation::UnknownNode { node: node.index() }.into()),
            NodeKind::Join { alpha, tests } => {
                let candidates: Vec<Timetag> = self
                    .alpha
                    .get(alpha)
                    .map(|m| m.wmes.iter().copied().collect())
                    .unwrap_or_default();
                let children = self.children_of(node);
                for tt in candidates {
                    let w = self.wme(tt)?;
                    if self.passes(&tests, parent, &w, symbols)? {
                        for &child in &children {
                            self.left_activate(child, parent, Some(tt), symbols)?;
                        }
                    }
                }
                Ok(())
            }
            NodeKind::Memory => {
                let t = self.make_token(node, parent, wme)?;
                self.propagate(node, t, symbols)
            }
            NodeKind::Negative { alpha, tests } => {
                let t = self.make_token(node, parent, wme)?;
                let candidates: Vec<Timetag> = self
                    .alpha
                    .get(alpha)
                    .map(|m| m.wmes.iter().copied().collect())
                    .unwrap_or_default();
                for tt in candidates {
                    let w = self.wme(tt)?;
                    if self.passes(&tests, t, &w, symbols)? {
                        self.tokens.expect_mut(t)?.blockers.insert(tt);
                        if let Some(entry) = self.wmes.get_mut(&tt) {
                            entry.blocking.insert(t);
                        }
                    }
                }
                if self.tokens.expect(t)?.blockers.is_empty() {
                    self.propagate(node, t, symbols)?;
                }
                Ok(())
            }
            NodeKind::Ncc { partner } => {
                let t = self.make_token(node, parent, wme)?;
                self.node_mut(node)?.ncc_owners.insert(parent, t);
                let pending = self.node_mut(partner)?.ncc_pending.remove(&parent).unwrap_or_default();
                for r in pending {
                    self.tokens.expect_mut(r)?.ncc_owner = Some(t);
                    self.tokens.expect_mut(t)?.ncc_results.insert(r);
                }
                if self.tokens.expect(t)?.ncc_results.is_empty() {
                    self.propagate(node, t, symbols)?;
                }
                Ok(())
            }
            NodeKind::NccPartner { ncc } => {
                let r = self.make_token(node, parent, wme)?;
                let Some(above) = self.parent_of(ncc) else {
                    return Err(InvariantViolation::UnknownNode { node: ncc.index() }.into());
                };
                let owner_parent = self.tokens.ancestor_at(parent, above)?;
                self.tokens.expect_mut(r)?.ncc_parent = Some(owner_parent);
                match self.node(ncc)?.ncc_owners.get(&owner_parent).copied() {
                    Some(owner) => {
                        self.tokens.expect_mut(r)?.ncc_owner = Some(owner);
                        let owner_token = self.tokens.expect_mut(owner)?;
                        let was_free = owner_token.ncc_results.is_empty();
                        owner_token.ncc_results.insert(r);
                        if was_free {
                            self.delete_children(owner, symbols)?;
                        }
                    }
                    None => {
                        self.node_mut(node)?
                            .ncc_pending
                            .entry(owner_parent)
                            .or_default()
                            .insert(r);
                    }
                }
                Ok(())
            }
            NodeKind::Production { production, .. } => {
                let t = self.make_token(node, parent, wme)?;
                self.match_set.assert(t, production);
                Ok(())
            }
        }
    }

    fn propagate(&mut self, node: NodeIndex, token: TokenId, symbols: &SymbolTable) -> HekaResult<()> {
        for child in self.children_of(node) {
            self.left_activate(child, token, None, symbols)?;
        }
        Ok(())
    }

    fn make_token(&mut self, node: NodeIndex, parent: TokenId, wme: Option<Timetag>) -> HekaResult<TokenId> {
        let t = self.tokens.create(node, Some(parent), wme);
        self.node_mut(node)?.tokens.insert(t);
        if let Some(tt) = wme {
            let entry = self
                .wmes
                .get_mut(&tt)
                .ok_or(InvariantViolation::UnknownWme { timetag: tt.0 })?;
            entry.tokens.insert(t);
        }
        Ok(t)
    }

    /// Tokens of `node` that currently let matches through.
    pub(super) fn active_tokens(&self, node: NodeIndex) -> HekaResult<Vec<TokenId>> {
        let beta = self.node(node)?;
        let out = beta
            .tokens
            .iter()
            .copied()
            .filter(|t| match (&beta.kind, self.tokens.get(*t)) {
                (NodeKind::Negative { .. }, Some(tok)) => tok.blockers.is_empty(),
                (NodeKind::Ncc { .. }, Some(tok)) => tok.ncc_results.is_empty(),
                (_, tok) => tok.is_some(),
            })
            .collect();
        Ok(out)
    }

    /// Run join tests for `w` against the partial match ending at `context`.
    pub(super) fn passes(
        &self,
        tests: &[JoinTest],
        context: TokenId,
        w: &Wme,
        symbols: &SymbolTable,
    ) -> HekaResult<bool> {
        for test in tests {
            let ok = match test {
                JoinTest::Disjunction { field, values } => values.contains(&w.field(*field)),
                JoinTest::Compare {
                    field,
                    relation,
                    other,
                } => {
                    let rhs = match other {
                        Source::Constant(c) => *c,
                        Source::Local(f) => w.field(*f),
                        Source::Bound { levels_up, field } => {
                            self.wme(self.tokens.nth_wme(context, *levels_up)?)?.field(*field)
                        }
                    };
                    relation_holds(*relation, w.field(*field), rhs, symbols)
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn delete_children(&mut self, token: TokenId, symbols: &SymbolTable) -> HekaResult<()> {
        let children: Vec<TokenId> = self.tokens.expect(token)?.children.iter().copied().collect();
        for child in children {
            if self.tokens.contains(child) {
                self.delete_token(child, symbols)?;
            }
        }
        Ok(())
    }

    /// Delete a token and everything below it, retracting complete matches
    /// and releasing conjunctive negation owners whose last result goes.
    pub(super) fn delete_token(&mut self, t: TokenId, symbols: &SymbolTable) -> HekaResult<()> {
        self.dying.insert(t);
        self.delete_children(t, symbols)?;
        let token = self
            .tokens
            .remove(t)
            .ok_or(InvariantViolation::UnknownToken { token: t.0 })?;

        let node = self.node_mut(token.node)?;
        node.tokens.shift_remove(&t);
        let kind = node.kind.clone();
        match kind {
            NodeKind::Production { production, .. } => self.match_set.retract(t, production),
            NodeKind::Ncc { .. } => {
                if let Some(p) = token.parent {
                    self.node_mut(token.node)?.ncc_owners.remove(&p);
                }
                for r in &token.ncc_results {
                    if let Some(result) = self.tokens.get_mut(*r) {
                        result.ncc_owner = None;
                    }
                }
            }
            NodeKind::NccPartner { ncc } => match token.ncc_owner {
                Some(owner) => self.release_owner(ncc, owner, t, symbols)?,
                None => {
                    if let Some(p) = token.ncc_parent {
                        let node = self.node_mut(token.node)?;
                        if let Some(pending) = node.ncc_pending.get_mut(&p) {
                            pending.shift_remove(&t);
                            if pending.is_empty() {
                                node.ncc_pending.remove(&p);
                            }
                        }
                    }
                }
            },
            _ => {}
        }

        if let Some(tt) = token.wme {
            if let Some(entry) = self.wmes.get_mut(&tt) {
                entry.tokens.shift_remove(&t);
            }
        }
        for b in &token.blockers {
            if let Some(entry) = self.wmes.get_mut(b) {
                entry.blocking.shift_remove(&t);
            }
        }
        self.dying.remove(&t);
        Ok(())
    }

    /// A partner result went away. If it was the owner's last one, and the
    /// owner is not itself being torn down, the owner matches again.
    fn release_owner(
        &mut self,
        ncc: NodeIndex,
        owner: TokenId,
        result: TokenId,
        symbols: &SymbolTable,
    ) -> HekaResult<()> {
        let Some(owner_token) = self.tokens.get_mut(owner) else {
            return Ok(());
        };
        owner_token.ncc_results.shift_remove(&result);
        if !owner_token.ncc_results.is_empty() {
            return Ok(());
        }
        let owner_parent = owner_token.parent;
        let tearing_down =
            self.dying.contains(&owner) || owner_parent.is_some_and(|p| self.dying.contains(&p));
        if tearing_down {
            return Ok(());
        }
        self.propagate(ncc, owner, symbols)
    }
}
