//! Productions: compiled condition/action rules.
//!
//! Productions are data, not code. They are built programmatically with the
//! constructors on [`Condition`], [`Test`] and [`Action`], checked by
//! [`validate`] and then handed to the agent, which owns them for as long as
//! they are in the match network.

mod action;
mod condition;
mod validate;

pub use action::{Action, FunctionCall, MakeAction, RhsValue};
pub use condition::{Condition, Field, Operand, Pattern, Relation, Test, Variable};
pub use validate::validate;
pub(crate) use validate::reorder;

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// Handle of a production in the agent's production store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductionId(pub u64);

impl std::fmt::Display for ProductionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "prod:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionType {
    User,
    Chunk,
    Justification,
    Default,
    Template,
}

/// Support a production declares for the preferences it makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportMode {
    /// Computed from what the instantiation tests.
    Undeclared,
    OSupport,
    ISupport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub name: String,
    pub kind: ProductionType,
    pub support: SupportMode,
    pub documentation: Option<String>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub firing_count: u64,
    pub breakpoint: bool,
}

impl Production {
    /// An empty user production. Add conditions with [`Production::when`]
    /// and actions with [`Production::then`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProductionType::User,
            support: SupportMode::Undeclared,
            documentation: None,
            conditions: Vec::new(),
            actions: Vec::new(),
            firing_count: 0,
            breakpoint: false,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_type(mut self, kind: ProductionType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_support(mut self, support: SupportMode) -> Self {
        self.support = support;
        self
    }

    pub fn documented(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }

    /// Whether any action proposes an operator.
    pub fn proposes_operator(&self, operator_attr: SymbolId) -> bool {
        self.actions.iter().any(|a| a.proposes(operator_attr))
    }

    /// Constant symbols mentioned on the left- and right-hand side.
    pub fn constants(&self) -> Vec<SymbolId> {
        let mut out = Vec::new();
        for c in &self.conditions {
            c.constants(&mut out);
        }
        for a in &self.actions {
            let mut collect = |v: &RhsValue| rhs_constants(v, &mut out);
            match a {
                Action::Make(m) => {
                    collect(&m.id);
                    collect(&m.attr);
                    collect(&m.value);
                    if let Some(r) = &m.referent {
                        collect(r);
                    }
                }
                Action::Call(call) => call.args.iter().for_each(&mut collect),
            }
        }
        out.sort();
        out.dedup();
        out
    }
}

fn rhs_constants(value: &RhsValue, out: &mut Vec<SymbolId>) {
    match value {
        RhsValue::Constant(c) => out.push(*c),
        RhsValue::Variable(_) => {}
        RhsValue::Call(call) => call.args.iter().for_each(|a| rhs_constants(a, out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    #[test]
    fn builder_collects_parts() {
        let p = Production::new("propose*wait")
            .with_support(SupportMode::ISupport)
            .documented("propose waiting")
            .when(Condition::positive(
                Test::var("s"),
                Test::constant(sym(1)),
                Test::constant(sym(2)),
            ))
            .then(Action::make(
                RhsValue::var("s"),
                RhsValue::Constant(sym(3)),
                RhsValue::var("o"),
            ));
        assert_eq!(p.conditions.len(), 1);
        assert_eq!(p.actions.len(), 1);
        assert_eq!(p.kind, ProductionType::User);
        assert!(p.proposes_operator(sym(3)));
        assert_eq!(p.constants(), vec![sym(1), sym(2), sym(3)]);
    }
}
