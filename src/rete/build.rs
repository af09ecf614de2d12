//! Compiling productions into the network, and taking them out again.
//!
//! Compilation runs in two phases. Conditions are first turned into a plan of
//! alpha keys and join tests without touching the network, so a production
//! that fails to compile leaves no trace. The plan is then realised node by
//! node, reusing an existing child wherever one with the same shape hangs off
//! the current node, and each new node is primed with the matches already
//! present above it.

use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::stable_graph::NodeIndex;

use crate::error::{CompileError, HekaResult, InvariantViolation};
use crate::production::{
    Condition, Field, Operand, Pattern, Production, ProductionId, Relation, Test, Variable, reorder,
};
use crate::symbol::SymbolTable;

use super::alpha::{AlphaId, AlphaKey};
use super::node::{BetaNode, JoinTest, NodeKind, Source, VarLoc};
use super::Rete;

#[derive(Debug, Clone)]
enum Step {
    Positive { key: AlphaKey, tests: Vec<JoinTest> },
    Negative { key: AlphaKey, tests: Vec<JoinTest> },
    Ncc(Vec<Step>),
}

/// Variable bindings seen so far: the positive condition index that binds
/// each variable, and the field it binds.
#[derive(Debug, Clone, Default)]
struct Env {
    bindings: IndexMap<Variable, (usize, Field)>,
    levels: usize,
}

impl Env {
    fn bound(&self, var: &Variable) -> Option<Source> {
        self.bindings.get(var).map(|&(level, field)| Source::Bound {
            levels_up: self.levels - 1 - level,
            field,
        })
    }
}

struct Compiler<'a> {
    production: &'a str,
}

impl Compiler<'_> {
    fn unbound(&self, var: &Variable) -> CompileError {
        CompileError::UnboundVariable {
            production: self.production.to_string(),
            variable: var.name().to_string(),
        }
    }

    fn conditions(&self, conditions: &[Condition], env: &mut Env) -> Result<Vec<Step>, CompileError> {
        let mut steps = Vec::new();
        for condition in reorder(conditions) {
            match condition {
                Condition::Positive(p) => {
                    let (key, tests) = self.pattern(p, env, true)?;
                    steps.push(Step::Positive { key, tests });
                }
                Condition::Negative(p) => {
                    let (key, tests) = self.pattern(p, env, false)?;
                    steps.push(Step::Negative { key, tests });
                }
                Condition::ConjunctiveNegation(subs) => {
                    if subs.is_empty() {
                        return Err(CompileError::EmptyConjunctiveNegation {
                            production: self.production.to_string(),
                        });
                    }
                    let mut inner = env.clone();
                    steps.push(Step::Ncc(self.conditions(subs, &mut inner)?));
                }
            }
        }
        Ok(steps)
    }

    /// Equality tests go first across all three fields, so a variable bound
    /// anywhere in the pattern is available to the relational tests.
    fn pattern(&self, pattern: &Pattern, env: &mut Env, binds: bool) -> Result<(AlphaKey, Vec<JoinTest>), CompileError> {
        let mut key = AlphaKey {
            id: None,
            attr: None,
            value: None,
            acceptable: pattern.acceptable,
        };
        let mut tests = Vec::new();
        let mut local: IndexMap<Variable, Field> = IndexMap::new();

        for field in Field::ALL {
            self.equalities(pattern.test(field), field, env, &mut key, &mut tests, &mut local);
        }
        for field in Field::ALL {
            self.relationals(pattern.test(field), field, env, &mut tests, &local)?;
        }

        if binds {
            for (var, field) in local {
                env.bindings.insert(var, (env.levels, field));
            }
            env.levels += 1;
        }
        Ok((key, tests))
    }

    fn equalities(
        &self,
        test: &Test,
        field: Field,
        env: &Env,
        key: &mut AlphaKey,
        tests: &mut Vec<JoinTest>,
        local: &mut IndexMap<Variable, Field>,
    ) {
        match test {
            Test::Equality(Operand::Constant(c)) => {
                let slot = match field {
                    Field::Id => &mut key.id,
                    Field::Attr => &mut key.attr,
                    Field::Value => &mut key.value,
                };
                if slot.is_none() {
                    *slot = Some(*c);
                } else {
                    tests.push(JoinTest::Compare {
                        field,
                        relation: Relation::Equal,
                        other: Source::Constant(*c),
                    });
                }
            }
            Test::Equality(Operand::Variable(v)) => {
                let other = local.get(v).map(|f| Source::Local(*f)).or_else(|| env.bound(v));
                match other {
                    Some(other) => tests.push(JoinTest::Compare {
                        field,
                        relation: Relation::Equal,
                        other,
                    }),
                    None => {
                        local.insert(v.clone(), field);
                    }
                }
            }
            Test::Conjunctive(subs) => {
                for sub in subs {
                    self.equalities(sub, field, env, key, tests, local);
                }
            }
            _ => {}
        }
    }

    fn relationals(
        &self,
        test: &Test,
        field: Field,
        env: &Env,
        tests: &mut Vec<JoinTest>,
        local: &IndexMap<Variable, Field>,
    ) -> Result<(), CompileError> {
        match test {
            Test::Relational { relation, operand } => {
                let other = match operand {
                    Operand::Constant(c) => Source::Constant(*c),
                    Operand::Variable(v) => local
                        .get(v)
                        .map(|f| Source::Local(*f))
                        .or_else(|| env.bound(v))
                        .ok_or_else(|| self.unbound(v))?,
                };
                tests.push(JoinTest::Compare {
                    field,
                    relation: *relation,
                    other,
                });
            }
            Test::Disjunction(values) => {
                if values.is_empty() {
                    return Err(CompileError::EmptyDisjunction {
                        production: self.production.to_string(),
                    });
                }
                tests.push(JoinTest::Disjunction {
                    field,
                    values: values.clone(),
                });
            }
            Test::Conjunctive(subs) => {
                for sub in subs {
                    self.relationals(sub, field, env, tests, local)?;
                }
            }
            Test::Blank | Test::Equality(_) => {}
        }
        Ok(())
    }
}

impl Rete {
    /// Compile `production` into the network under `id` and prime it with
    /// the current WMEs. Resulting matches are posted as assertions.
    pub fn add_production(&mut self, id: ProductionId, production: &Production, symbols: &SymbolTable) -> HekaResult<()> {
        if self.productions.contains_key(&id) {
            self.remove_production(id, symbols)?;
        }
        let compiler = Compiler {
            production: &production.name,
        };
        let mut env = Env::default();
        let steps = compiler.conditions(&production.conditions, &mut env)?;
        if env.levels == 0 {
            return Err(CompileError::NoPositiveConditions {
                production: production.name.clone(),
            }
            .into());
        }
        let bindings: Arc<[(Variable, VarLoc)]> = env
            .bindings
            .iter()
            .map(|(var, &(level, field))| {
                (
                    var.clone(),
                    VarLoc {
                        levels_up: env.levels - 1 - level,
                        field,
                    },
                )
            })
            .collect();

        let bottom = self.realize(self.root, &steps, symbols)?;
        let pnode = self.attach(bottom, NodeKind::Production { production: id, bindings });
        self.productions.insert(id, pnode);
        self.prime(pnode, symbols)?;
        tracing::debug!(production = %production.name, node = pnode.index(), "production added to network");
        Ok(())
    }

    /// Take a production out of the network. Its live matches are posted as
    /// retractions and nodes nothing else uses are pruned. Returns whether
    /// the production was present.
    pub fn remove_production(&mut self, id: ProductionId, symbols: &SymbolTable) -> HekaResult<bool> {
        let Some(pnode) = self.productions.remove(&id) else {
            return Ok(false);
        };
        self.remove_node(pnode, symbols)?;
        Ok(true)
    }

    fn realize(&mut self, mut current: NodeIndex, steps: &[Step], symbols: &SymbolTable) -> HekaResult<NodeIndex> {
        for step in steps {
            current = match step {
                Step::Positive { key, tests } => {
                    let holder = self.token_holder(current, symbols)?;
                    let alpha = self.alpha_for(*key);
                    self.find_or_add(
                        holder,
                        NodeKind::Join {
                            alpha,
                            tests: tests.clone().into(),
                        },
                        symbols,
                    )?
                }
                Step::Negative { key, tests } => {
                    let alpha = self.alpha_for(*key);
                    self.find_or_add(
                        current,
                        NodeKind::Negative {
                            alpha,
                            tests: tests.clone().into(),
                        },
                        symbols,
                    )?
                }
                Step::Ncc(sub) => {
                    let holder = self.token_holder(current, symbols)?;
                    let bottom = self.realize(holder, sub, symbols)?;
                    match self.shared_ncc(holder, bottom)? {
                        Some(ncc) => ncc,
                        None => {
                            // Partner index is unknown until it is attached.
                            let ncc = self.attach(holder, NodeKind::Ncc { partner: holder });
                            let partner = self.attach(bottom, NodeKind::NccPartner { ncc });
                            self.node_mut(ncc)?.kind = NodeKind::Ncc { partner };
                            self.prime(partner, symbols)?;
                            self.prime(ncc, symbols)?;
                            ncc
                        }
                    }
                }
            };
        }
        Ok(current)
    }

    /// A conjunctive negation below `holder` whose subnetwork ends at
    /// `bottom`. Identical subnetworks share every node, so equal bottoms
    /// mean equal negations.
    fn shared_ncc(&self, holder: NodeIndex, bottom: NodeIndex) -> HekaResult<Option<NodeIndex>> {
        for child in self.children_of(holder) {
            if let NodeKind::Ncc { partner } = self.node(child)?.kind {
                if self.parent_of(partner) == Some(bottom) {
                    return Ok(Some(child));
                }
            }
        }
        Ok(None)
    }

    /// Joins pass matches through without storing them, so anything that
    /// needs stored parent tokens gets a memory node below a join.
    fn token_holder(&mut self, current: NodeIndex, symbols: &SymbolTable) -> HekaResult<NodeIndex> {
        if self.node(current)?.holds_tokens() {
            Ok(current)
        } else {
            self.find_or_add(current, NodeKind::Memory, symbols)
        }
    }

    fn find_or_add(&mut self, parent: NodeIndex, kind: NodeKind, symbols: &SymbolTable) -> HekaResult<NodeIndex> {
        for child in self.children_of(parent) {
            if self.node(child)?.kind.shares_with(&kind) {
                return Ok(child);
            }
        }
        let alpha = match &kind {
            NodeKind::Join { alpha, .. } | NodeKind::Negative { alpha, .. } => Some(*alpha),
            _ => None,
        };
        let idx = self.attach(parent, kind);
        if let Some(alpha) = alpha {
            self.alpha.add_successor(alpha, idx);
        }
        self.prime(idx, symbols)?;
        Ok(idx)
    }

    fn attach(&mut self, parent: NodeIndex, kind: NodeKind) -> NodeIndex {
        let idx = self.graph.add_node(BetaNode::new(kind));
        self.graph.add_edge(parent, idx, ());
        idx
    }

    /// Alpha memory for `key`, created and filled from the current WMEs if
    /// it does not exist yet.
    fn alpha_for(&mut self, key: AlphaKey) -> AlphaId {
        if let Some(id) = self.alpha.find(&key) {
            return id;
        }
        let id = self.alpha.create(key);
        let mut matching: Vec<_> = self
            .wmes
            .values_mut()
            .filter(|e| key.matches(&e.wme))
            .map(|e| {
                e.alphas.push(id);
                e.wme.timetag
            })
            .collect();
        matching.sort();
        if let Some(mem) = self.alpha.get_mut(id) {
            mem.wmes.extend(matching);
        }
        id
    }

    /// Feed a freshly created node every match its parent currently passes
    /// on.
    fn prime(&mut self, node: NodeIndex, symbols: &SymbolTable) -> HekaResult<()> {
        let Some(parent) = self.parent_of(node) else {
            return Err(InvariantViolation::UnknownNode { node: node.index() }.into());
        };
        match self.node(parent)?.kind.clone() {
            NodeKind::Join { alpha, tests } => {
                let Some(above) = self.parent_of(parent) else {
                    return Err(InvariantViolation::UnknownNode { node: parent.index() }.into());
                };
                let wmes: Vec<_> = self
                    .alpha
                    .get(alpha)
                    .map(|m| m.wmes.iter().copied().collect())
                    .unwrap_or_default();
                for t in self.active_tokens(above)? {
                    for &tt in &wmes {
                        let w = self.wme(tt)?;
                        if self.passes(&tests, t, &w, symbols)? {
                            self.left_activate(node, t, Some(tt), symbols)?;
                        }
                    }
                }
            }
            _ => {
                for t in self.active_tokens(parent)? {
                    self.left_activate(node, t, None, symbols)?;
                }
            }
        }
        Ok(())
    }

    /// Remove a childless node and prune upwards while ancestors are left
    /// without children.
    fn remove_node(&mut self, node: NodeIndex, symbols: &SymbolTable) -> HekaResult<()> {
        let parent = self.parent_of(node);
        let held: Vec<_> = self.node(node)?.tokens.iter().copied().collect();
        for t in held {
            if self.tokens.contains(t) {
                self.delete_token(t, symbols)?;
            }
        }
        match self.node(node)?.kind.clone() {
            NodeKind::Join { alpha, .. } | NodeKind::Negative { alpha, .. } => {
                if let Some(mem) = self.alpha.remove_successor(alpha, node) {
                    for tt in mem.wmes {
                        if let Some(entry) = self.wmes.get_mut(&tt) {
                            entry.alphas.retain(|a| *a != alpha);
                        }
                    }
                }
            }
            NodeKind::Ncc { partner } => self.remove_node(partner, symbols)?,
            _ => {}
        }
        self.graph.remove_node(node);
        if let Some(p) = parent {
            if p != self.root && self.children_of(p).is_empty() {
                self.remove_node(p, symbols)?;
            }
        }
        Ok(())
    }
}
