//! Right-hand side representation: make-preference actions and function calls.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::preference::PreferenceType;
use crate::symbol::SymbolId;

use super::Variable;

/// A value computed when an action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RhsValue {
    Constant(SymbolId),
    /// A bound variable, or a fresh identifier if the LHS never binds it.
    Variable(Variable),
    Call(FunctionCall),
}

impl RhsValue {
    pub fn var(name: &str) -> Self {
        RhsValue::Variable(Variable::new(name))
    }

    fn collect(&self, vars: &mut BTreeSet<Variable>, functions: &mut Vec<String>) {
        match self {
            RhsValue::Constant(_) => {}
            RhsValue::Variable(v) => {
                vars.insert(v.clone());
            }
            RhsValue::Call(call) => call.collect(vars, functions),
        }
    }
}

/// Call of a registered RHS function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<RhsValue>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<RhsValue>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    fn collect(&self, vars: &mut BTreeSet<Variable>, functions: &mut Vec<String>) {
        functions.push(self.name.clone());
        for arg in &self.args {
            arg.collect(vars, functions);
        }
    }
}

/// Assert a preference `(id ^attr value <kind> referent?)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeAction {
    pub id: RhsValue,
    pub attr: RhsValue,
    pub value: RhsValue,
    pub preference: PreferenceType,
    pub referent: Option<RhsValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Make(MakeAction),
    /// Call a function for its side effect and discard the result.
    Call(FunctionCall),
}

impl Action {
    /// `(id ^attr value +)`
    pub fn make(id: RhsValue, attr: RhsValue, value: RhsValue) -> Self {
        Self::prefer(id, attr, value, PreferenceType::Acceptable, None)
    }

    pub fn prefer(
        id: RhsValue,
        attr: RhsValue,
        value: RhsValue,
        preference: PreferenceType,
        referent: Option<RhsValue>,
    ) -> Self {
        Action::Make(MakeAction {
            id,
            attr,
            value,
            preference,
            referent,
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<RhsValue>) -> Self {
        Action::Call(FunctionCall::new(name, args))
    }

    /// Variables and function names used by the action.
    pub fn references(&self) -> (BTreeSet<Variable>, Vec<String>) {
        let mut vars = BTreeSet::new();
        let mut functions = Vec::new();
        match self {
            Action::Make(m) => {
                for v in [&m.id, &m.attr, &m.value] {
                    v.collect(&mut vars, &mut functions);
                }
                if let Some(r) = &m.referent {
                    r.collect(&mut vars, &mut functions);
                }
            }
            Action::Call(call) => call.collect(&mut vars, &mut functions),
        }
        (vars, functions)
    }

    /// Whether this action proposes an operator, `(<s> ^operator <o> +)`.
    pub fn proposes(&self, operator_attr: SymbolId) -> bool {
        matches!(
            self,
            Action::Make(MakeAction {
                attr: RhsValue::Constant(a),
                preference: PreferenceType::Acceptable | PreferenceType::Require,
                ..
            }) if *a == operator_attr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    #[test]
    fn references_walk_nested_calls() {
        let action = Action::make(
            RhsValue::var("s"),
            RhsValue::Constant(sym(1)),
            RhsValue::Call(FunctionCall::new(
                "+",
                vec![RhsValue::var("x"), RhsValue::Constant(sym(2))],
            )),
        );
        let (vars, functions) = action.references();
        assert_eq!(vars.len(), 2);
        assert_eq!(functions, vec!["+".to_string()]);
    }

    #[test]
    fn proposal_detection() {
        let operator = sym(7);
        let propose = Action::make(RhsValue::var("s"), RhsValue::Constant(operator), RhsValue::var("o"));
        let better = Action::prefer(
            RhsValue::var("s"),
            RhsValue::Constant(operator),
            RhsValue::var("o"),
            PreferenceType::Better,
            Some(RhsValue::var("p")),
        );
        assert!(propose.proposes(operator));
        assert!(!better.proposes(operator));
    }
}
