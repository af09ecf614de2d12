//! Incremental pattern matcher.
//!
//! A Rete network in the classic alpha/beta split:
//!
//! - **Alpha network** ([`alpha`]): constant tests, indexed so that a WME
//!   reaches exactly the alpha memories whose key it satisfies.
//! - **Beta network**: a `petgraph` DAG of join, negative, conjunctive
//!   negation and production nodes. Structurally identical condition
//!   prefixes share nodes.
//! - **Tokens** ([`token`]): partial matches, kept consistent as WMEs and
//!   productions come and go.
//!
//! The network never fires anything. Complete matches accumulate as
//! assertions and retractions, and the agent collects them with
//! [`Rete::drain`].

mod activate;
mod alpha;
mod build;
mod matchset;
mod node;
mod token;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use indexmap::IndexSet;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::Serialize;

use crate::error::{HekaResult, InvariantViolation};
use crate::instantiation::{Bindings, InstantiationId};
use crate::memory::{Timetag, Wme};
use crate::production::ProductionId;
use crate::symbol::SymbolTable;

use alpha::{AlphaId, AlphaNetwork};
use matchset::MatchSet;
use node::{BetaNode, NodeKind};
use token::{TokenId, TokenStore};

/// A complete match handed to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReteMatch {
    pub instantiation: InstantiationId,
    pub production: ProductionId,
    /// WMEs matched by the positive conditions, in condition order.
    pub wmes: Vec<Wme>,
    pub bindings: Bindings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchSetEvent {
    Assert(ReteMatch),
    Retract {
        instantiation: InstantiationId,
        production: ProductionId,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReteStats {
    pub beta_nodes: usize,
    pub alpha_memories: usize,
    pub tokens: usize,
    pub productions: usize,
    pub wmes: usize,
    pub pending: usize,
}

/// A WME known to the network, with reverse links to everything that refers
/// to it.
#[derive(Debug)]
struct WmeEntry {
    wme: Wme,
    alphas: Vec<AlphaId>,
    tokens: IndexSet<TokenId>,
    /// Negative node tokens this WME blocks.
    blocking: IndexSet<TokenId>,
}

#[derive(Debug)]
pub struct Rete {
    graph: StableDiGraph<BetaNode, ()>,
    root: NodeIndex,
    root_token: TokenId,
    alpha: AlphaNetwork,
    tokens: TokenStore,
    wmes: HashMap<Timetag, WmeEntry>,
    productions: BTreeMap<ProductionId, NodeIndex>,
    match_set: MatchSet,
    /// Tokens part-way through deletion.
    dying: HashSet<TokenId>,
}

impl Default for Rete {
    fn default() -> Self {
        Self::new()
    }
}

impl Rete {
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(BetaNode::new(NodeKind::Root));
        let mut tokens = TokenStore::new();
        let root_token = tokens.create(root, None, None);
        graph[root].tokens.insert(root_token);
        Self {
            graph,
            root,
            root_token,
            alpha: AlphaNetwork::new(),
            tokens,
            wmes: HashMap::new(),
            productions: BTreeMap::new(),
            match_set: MatchSet::new(),
            dying: HashSet::new(),
        }
    }

    pub fn contains_production(&self, id: ProductionId) -> bool {
        self.productions.contains_key(&id)
    }

    pub fn contains_wme(&self, timetag: Timetag) -> bool {
        self.wmes.contains_key(&timetag)
    }

    /// Whether any assertions or retractions wait to be drained.
    pub fn has_pending(&self) -> bool {
        !self.match_set.is_empty()
    }

    /// Collect the pending changes to the match set: retractions first, then
    /// assertions, each in posting order.
    pub fn drain(&mut self) -> HekaResult<Vec<MatchSetEvent>> {
        let (retracted, asserted) = self.match_set.drain();
        let mut out = Vec::with_capacity(retracted.len() + asserted.len());
        for (token, production) in retracted {
            out.push(MatchSetEvent::Retract {
                instantiation: InstantiationId(token.0),
                production,
            });
        }
        for (token, production) in asserted {
            out.push(MatchSetEvent::Assert(self.build_match(token, production)?));
        }
        Ok(out)
    }

    /// Every complete match currently held, as production and matched
    /// timetags, sorted.
    pub fn matches(&self) -> Vec<(ProductionId, Vec<Timetag>)> {
        let mut out = Vec::new();
        for (&id, &node) in &self.productions {
            let Some(beta) = self.graph.node_weight(node) else {
                continue;
            };
            for &token in &beta.tokens {
                if let Ok(chain) = self.tokens.wme_chain(token) {
                    out.push((id, chain));
                }
            }
        }
        out.sort();
        out
    }

    pub fn stats(&self) -> ReteStats {
        ReteStats {
            beta_nodes: self.graph.node_count(),
            alpha_memories: self.alpha.len(),
            tokens: self.tokens.len(),
            productions: self.productions.len(),
            wmes: self.wmes.len(),
            pending: self.match_set.len(),
        }
    }

    /// Graphviz rendering of the network. Alpha memories are boxes feeding
    /// their successors with dashed edges.
    pub fn to_dot(&self, symbols: &SymbolTable) -> String {
        let mut out = String::from("digraph rete {\n  rankdir=TB;\n");
        let field = |s: Option<crate::symbol::SymbolId>| s.map_or_else(|| "*".to_string(), |s| symbols.display(s));

        let mut alphas: Vec<_> = self.alpha.iter().collect();
        alphas.sort_by_key(|(id, _)| *id);
        for (id, mem) in alphas {
            let _ = writeln!(
                out,
                "  a{} [shape=box, label=\"({} ^{} {}{}) [{}]\"];",
                id.0,
                field(mem.key.id),
                field(mem.key.attr),
                field(mem.key.value),
                if mem.key.acceptable { " +" } else { "" },
                mem.wmes.len()
            );
            for succ in &mem.successors {
                let _ = writeln!(out, "  a{} -> n{} [style=dashed];", id.0, succ.index());
            }
        }
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let label = match &node.kind {
                NodeKind::Production { production, .. } => format!("{production}"),
                NodeKind::Join { tests, .. } | NodeKind::Negative { tests, .. } => {
                    format!("{} ({} tests)", node.kind.label(), tests.len())
                }
                other => other.label().to_string(),
            };
            let _ = writeln!(
                out,
                "  n{} [label=\"{} [{}]\"];",
                idx.index(),
                label,
                node.tokens.len()
            );
            for child in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let _ = writeln!(out, "  n{} -> n{};", idx.index(), child.index());
            }
        }
        out.push_str("}\n");
        out
    }

    // -----------------------------------------------------------------------
    // Graph helpers
    // -----------------------------------------------------------------------

    fn node(&self, idx: NodeIndex) -> HekaResult<&BetaNode> {
        self.graph
            .node_weight(idx)
            .ok_or_else(|| InvariantViolation::UnknownNode { node: idx.index() }.into())
    }

    fn node_mut(&mut self, idx: NodeIndex) -> HekaResult<&mut BetaNode> {
        self.graph
            .node_weight_mut(idx)
            .ok_or_else(|| InvariantViolation::UnknownNode { node: idx.index() }.into())
    }

    fn parent_of(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Incoming).next()
    }

    fn children_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Outgoing).collect()
    }

    fn wme(&self, timetag: Timetag) -> HekaResult<Wme> {
        self.wmes
            .get(&timetag)
            .map(|e| e.wme)
            .ok_or_else(|| InvariantViolation::UnknownWme { timetag: timetag.0 }.into())
    }

    fn build_match(&self, token: TokenId, production: ProductionId) -> HekaResult<ReteMatch> {
        let node = self.tokens.expect(token)?.node;
        let NodeKind::Production { bindings: locs, .. } = &self.node(node)?.kind else {
            return Err(InvariantViolation::UnknownNode { node: node.index() }.into());
        };
        let wmes = self
            .tokens
            .wme_chain(token)?
            .into_iter()
            .map(|tt| self.wme(tt))
            .collect::<HekaResult<Vec<_>>>()?;
        let mut bindings = Bindings::new();
        for (var, loc) in locs.iter() {
            let w = self.wme(self.tokens.nth_wme(token, loc.levels_up)?)?;
            bindings.insert(var.clone(), w.field(loc.field));
        }
        Ok(ReteMatch {
            instantiation: InstantiationId(token.0),
            production,
            wmes,
            bindings,
        })
    }
}

#[cfg(test)]
mod tests;
