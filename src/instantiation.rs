//! Instantiations: concrete, firing-ready bindings of a production.
//!
//! An instantiation records which WMEs satisfied each positive condition and
//! the variable bindings they produced. Learning collaborators read
//! `matched`, `backtrace_number` and `match_goal_level`; these stay valid
//! until the instantiation is retracted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::memory::Wme;
use crate::preference::PreferenceId;
use crate::production::{ProductionId, Variable};
use crate::symbol::SymbolId;

/// Handle of an instantiation. It is the id of the production-node token that
/// produced it, so it is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstantiationId(pub u64);

impl std::fmt::Display for InstantiationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inst:{}", self.0)
    }
}

/// Variable bindings in the order the variables were first bound.
pub type Bindings = IndexMap<Variable, SymbolId>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instantiation {
    pub id: InstantiationId,
    pub production: ProductionId,
    pub production_name: String,
    /// WMEs matched by the positive conditions, in condition order.
    pub matched: Vec<Wme>,
    pub bindings: Bindings,
    /// Deepest goal among the matched identifiers.
    pub match_goal: Option<SymbolId>,
    pub match_goal_level: Option<u32>,
    /// Scratch mark for backtracing collaborators.
    pub backtrace_number: u64,
    /// Preferences this instantiation asserted and that are still live.
    pub preferences: Vec<PreferenceId>,
    pub fired: bool,
    pub retracted: bool,
}

impl Instantiation {
    pub fn matched_conditions(&self) -> &[Wme] {
        &self.matched
    }

    pub fn binding(&self, variable: &Variable) -> Option<SymbolId> {
        self.bindings.get(variable).copied()
    }

    /// Whether the match includes the selected (non-acceptable) operator of
    /// its own match goal.
    pub fn tests_selected_operator(&self, operator_attr: SymbolId) -> bool {
        match self.match_goal {
            Some(goal) => self
                .matched
                .iter()
                .any(|w| w.id == goal && w.attr == operator_attr && !w.acceptable),
            None => false,
        }
    }

    /// Mark for a backtracing pass. Returns `false` if already marked with `n`.
    pub fn mark_backtrace(&mut self, n: u64) -> bool {
        if self.backtrace_number == n {
            return false;
        }
        self.backtrace_number = n;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Timetag;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    fn wme(tt: u64, id: u64, attr: u64, value: u64, acceptable: bool) -> Wme {
        Wme {
            timetag: Timetag(tt),
            id: sym(id),
            attr: sym(attr),
            value: sym(value),
            acceptable,
        }
    }

    fn inst(matched: Vec<Wme>) -> Instantiation {
        Instantiation {
            id: InstantiationId(1),
            production: ProductionId(1),
            production_name: "apply".into(),
            matched,
            bindings: Bindings::new(),
            match_goal: Some(sym(1)),
            match_goal_level: Some(1),
            backtrace_number: 0,
            preferences: Vec::new(),
            fired: false,
            retracted: false,
        }
    }

    #[test]
    fn selected_operator_detection() {
        let operator = sym(10);
        assert!(inst(vec![wme(1, 1, 10, 20, false)]).tests_selected_operator(operator));
        assert!(!inst(vec![wme(1, 1, 10, 20, true)]).tests_selected_operator(operator));
        assert!(!inst(vec![wme(1, 2, 10, 20, false)]).tests_selected_operator(operator));
    }

    #[test]
    fn backtrace_marking() {
        let mut i = inst(Vec::new());
        assert!(i.mark_backtrace(3));
        assert!(!i.mark_backtrace(3));
        assert_eq!(i.backtrace_number, 3);
    }
}
