//! Beta network nodes and the variable-consistency tests they run.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexSet;
use petgraph::stable_graph::NodeIndex;

use crate::production::{Field, ProductionId, Relation, Variable};
use crate::symbol::{SymbolId, SymbolTable};

use super::alpha::AlphaId;
use super::token::TokenId;

/// Where the right-hand side of a join test comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Constant(SymbolId),
    /// A field of a WME matched earlier, counted in positive conditions
    /// above the one being joined.
    Bound { levels_up: usize, field: Field },
    /// Another field of the WME being joined.
    Local(Field),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinTest {
    Compare {
        field: Field,
        relation: Relation,
        other: Source,
    },
    Disjunction {
        field: Field,
        values: Vec<SymbolId>,
    },
}

/// Location of a variable's binding, relative to the production node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLoc {
    pub levels_up: usize,
    pub field: Field,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    /// Stores the tokens produced by the join above it.
    Memory,
    Join {
        alpha: AlphaId,
        tests: Arc<[JoinTest]>,
    },
    Negative {
        alpha: AlphaId,
        tests: Arc<[JoinTest]>,
    },
    /// Conjunctive negation. Its subnetwork hangs off the same parent and
    /// ends in `partner`. Reused when a new subnetwork ends at the same node
    /// as `partner`'s parent, so it never matches in `shares_with`.
    Ncc { partner: NodeIndex },
    NccPartner { ncc: NodeIndex },
    Production {
        production: ProductionId,
        bindings: Arc<[(Variable, VarLoc)]>,
    },
}

impl NodeKind {
    /// Whether a node of this kind may be reused for `other`.
    pub fn shares_with(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Memory, NodeKind::Memory) => true,
            (
                NodeKind::Join { alpha: a, tests: t },
                NodeKind::Join { alpha: b, tests: u },
            )
            | (
                NodeKind::Negative { alpha: a, tests: t },
                NodeKind::Negative { alpha: b, tests: u },
            ) => a == b && t == u,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Memory => "memory",
            NodeKind::Join { .. } => "join",
            NodeKind::Negative { .. } => "negative",
            NodeKind::Ncc { .. } => "ncc",
            NodeKind::NccPartner { .. } => "ncc-partner",
            NodeKind::Production { .. } => "production",
        }
    }
}

#[derive(Debug)]
pub struct BetaNode {
    pub kind: NodeKind,
    pub tokens: IndexSet<TokenId>,
    /// Conjunctive negation nodes: token of the parent node to the token
    /// this node created for it.
    pub ncc_owners: HashMap<TokenId, TokenId>,
    /// Partner nodes: results whose owner has not been created yet, keyed by
    /// the parent token they belong to.
    pub ncc_pending: HashMap<TokenId, IndexSet<TokenId>>,
}

impl BetaNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            tokens: IndexSet::new(),
            ncc_owners: HashMap::new(),
            ncc_pending: HashMap::new(),
        }
    }

    /// Join nodes pass matches straight through; everything else stores them.
    pub fn holds_tokens(&self) -> bool {
        !matches!(self.kind, NodeKind::Join { .. })
    }
}

/// Apply a relation to two symbols. Ordering relations hold only between
/// comparable symbols.
pub fn relation_holds(relation: Relation, a: SymbolId, b: SymbolId, symbols: &SymbolTable) -> bool {
    match relation {
        Relation::Equal => a == b,
        Relation::NotEqual => a != b,
        Relation::SameType => symbols.same_type(a, b),
        Relation::Less => symbols.compare(a, b) == Some(Ordering::Less),
        Relation::LessOrEqual => matches!(symbols.compare(a, b), Some(Ordering::Less | Ordering::Equal)),
        Relation::Greater => symbols.compare(a, b) == Some(Ordering::Greater),
        Relation::GreaterOrEqual => {
            matches!(symbols.compare(a, b), Some(Ordering::Greater | Ordering::Equal))
        }
    }
}
