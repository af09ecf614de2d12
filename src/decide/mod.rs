//! The decider: the goal stack and everything that changes it.
//!
//! Each goal owns one context slot, its `^operator` slot. During the decision
//! phase the decider walks the stack from the highest goal whose slot changed
//! and decides the first slot that can be decided:
//!
//! - a single winner is installed as `(S ^operator O)`
//! - anything else becomes an impasse, which the decider represents as a new
//!   substate one level below
//!
//! Between decisions ([`Decider::update_slots`]) non-context slots follow
//! their preferences directly, installed operators are checked for
//! consistency, and goals whose dependency sets were invalidated are removed.

mod goals;
mod semantics;
mod select;
mod slots;

pub use goals::GoalInfo;
pub use semantics::{ImpasseType, Semantics, run_preference_semantics};
pub use select::Selector;

use serde::Serialize;

use crate::config::AgentConfig;
use crate::error::{HekaResult, InvariantViolation};
use crate::kernel::Kernel;
use crate::memory::{SlotKey, Support};
use crate::preference::{PreferenceId, PreferenceType};
use crate::symbol::{SymbolId, SymbolTable};

/// Symbols the architecture writes into working memory.
#[derive(Debug, Clone, Copy)]
pub struct ArchSymbols {
    pub operator: SymbolId,
    pub type_attr: SymbolId,
    pub state: SymbolId,
    pub superstate: SymbolId,
    pub nil: SymbolId,
    pub impasse: SymbolId,
    pub attribute: SymbolId,
    pub choices: SymbolId,
    pub item: SymbolId,
    pub item_count: SymbolId,
}

impl ArchSymbols {
    pub fn intern(symbols: &mut SymbolTable) -> HekaResult<Self> {
        Ok(Self {
            operator: symbols.intern_str("operator")?,
            type_attr: symbols.intern_str("type")?,
            state: symbols.intern_str("state")?,
            superstate: symbols.intern_str("superstate")?,
            nil: symbols.intern_str("nil")?,
            impasse: symbols.intern_str("impasse")?,
            attribute: symbols.intern_str("attribute")?,
            choices: symbols.intern_str("choices")?,
            item: symbols.intern_str("item")?,
            item_count: symbols.intern_str("item-count")?,
        })
    }
}

/// An impasse on a non-context slot. These never get a substate; the slot
/// simply holds no values until its preferences change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotImpasse {
    pub id: SymbolId,
    pub attr: SymbolId,
    pub impasse: ImpasseType,
    pub items: Vec<SymbolId>,
}

/// Outcome of one decision phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum Decision {
    OperatorSelected {
        goal: SymbolId,
        operator: SymbolId,
    },
    ImpasseCreated {
        goal: SymbolId,
        substate: SymbolId,
        impasse: ImpasseType,
    },
    /// An existing impasse of the same kind got a new item set.
    ImpasseUpdated {
        goal: SymbolId,
        substate: SymbolId,
    },
    /// An impasse was due but the goal stack is already at its limit.
    GoalDepthExceeded { goal: SymbolId },
    Nothing,
}

#[derive(Debug)]
pub struct Decider {
    arch: ArchSymbols,
    top: SymbolId,
    /// Top goal first.
    goals: Vec<GoalInfo>,
    selector: Selector,
    /// Index of the highest goal whose context slot changed.
    highest_changed: Option<usize>,
    wait_on_state_no_change: bool,
    max_goal_depth: u32,
}

impl Decider {
    /// Create the decider and the top goal `S1`.
    pub fn new(kernel: &mut Kernel, config: &AgentConfig) -> HekaResult<Self> {
        let arch = ArchSymbols::intern(&mut kernel.symbols)?;
        let top = goals::create_top_goal(kernel, &arch)?;
        Ok(Self {
            arch,
            top: top.id,
            goals: vec![top],
            selector: Selector::new(config.selection, config.numeric_combination, config.seed),
            highest_changed: None,
            wait_on_state_no_change: config.wait_on_state_no_change,
            max_goal_depth: config.max_goal_depth,
        })
    }

    pub fn arch(&self) -> &ArchSymbols {
        &self.arch
    }

    pub fn top_goal(&self) -> SymbolId {
        self.top
    }

    pub fn bottom_goal(&self) -> SymbolId {
        self.goals.last().map_or(self.top, |g| g.id)
    }

    pub fn goals(&self) -> &[GoalInfo] {
        &self.goals
    }

    pub fn depth(&self) -> usize {
        self.goals.len()
    }

    pub fn goal_index(&self, goal: SymbolId) -> Option<usize> {
        self.goals.iter().position(|g| g.id == goal)
    }

    pub fn goal_info(&self, goal: SymbolId) -> Option<&GoalInfo> {
        self.goals.iter().find(|g| g.id == goal)
    }

    /// Goal at a stack level, the top goal being level 1.
    pub fn goal_at_level(&self, level: u32) -> Option<SymbolId> {
        let idx = usize::try_from(level.checked_sub(1)?).ok()?;
        self.goals.get(idx).map(|g| g.id)
    }

    pub fn selector_mut(&mut self) -> &mut Selector {
        &mut self.selector
    }

    fn operator_slot(&self, idx: usize) -> HekaResult<SlotKey> {
        let goal = self.goals.get(idx).ok_or_else(|| InvariantViolation::UnknownGoal {
            goal: format!("#{idx}"),
        })?;
        Ok(SlotKey::new(goal.id, self.arch.operator))
    }

    /// Operator currently installed for `goal`.
    pub fn installed_operator(&self, kernel: &Kernel, goal: SymbolId) -> Option<SymbolId> {
        let slot = kernel.memory.slot(SlotKey::new(goal, self.arch.operator))?;
        let tt = slot.wmes.first()?;
        kernel.memory.get(*tt).map(|r| r.wme.value)
    }

    fn note_changed(&mut self, idx: usize) {
        self.highest_changed = Some(self.highest_changed.map_or(idx, |h| h.min(idx)));
    }

    /// An empty context slot can be decided once it has preferences; an
    /// installed operator only when something asks for it to be reconsidered.
    fn decidable(&self, kernel: &Kernel, idx: usize) -> bool {
        let Ok(key) = self.operator_slot(idx) else {
            return false;
        };
        let Some(slot) = kernel.memory.slot(key) else {
            return false;
        };
        match slot.wmes.first().and_then(|tt| kernel.memory.get(*tt)) {
            None => !slot.preferences.is_empty(),
            Some(installed) => kernel
                .slot_preferences(key)
                .iter()
                .any(|p| p.kind == PreferenceType::Reconsider && p.value == installed.wme.value),
        }
    }

    /// Run the decision phase.
    pub fn decide(&mut self, kernel: &mut Kernel) -> HekaResult<Decision> {
        self.process_doomed_goals(kernel)?;
        let bottom = self.goals.len().saturating_sub(1);
        let mut idx = self.highest_changed.take().map_or(bottom, |h| h.min(bottom));
        let mut updated = None;
        loop {
            let bottom = self.goals.len().saturating_sub(1);
            while idx < bottom && !self.decidable(kernel, idx) {
                idx += 1;
            }
            match self.decide_context_slot(kernel, idx)? {
                d @ Decision::ImpasseUpdated { .. } => {
                    updated = Some(d);
                    idx += 1;
                    if idx >= self.goals.len() {
                        return Ok(updated.unwrap_or(Decision::Nothing));
                    }
                }
                Decision::Nothing => return Ok(updated.unwrap_or(Decision::Nothing)),
                d => return Ok(d),
            }
        }
    }

    fn decide_context_slot(&mut self, kernel: &mut Kernel, idx: usize) -> HekaResult<Decision> {
        let key = self.operator_slot(idx)?;
        let goal = key.ident;
        let installed = kernel.memory.slot(key).and_then(|s| s.wmes.first().copied());
        let has_preferences = kernel.memory.slot(key).is_some_and(|s| !s.preferences.is_empty());

        let (impasse, items, attribute) = if !self.decidable(kernel, idx) {
            let attribute = if installed.is_some() {
                self.arch.operator
            } else {
                self.arch.state
            };
            (ImpasseType::NoChange, Vec::new(), attribute)
        } else {
            let (semantics, winner, winning_pref) = {
                let prefs = kernel.slot_preferences(key);
                let semantics = run_preference_semantics(&prefs, true, false);
                let winner = match semantics.impasse {
                    ImpasseType::None if semantics.indifferent => {
                        self.selector.choose(&semantics.candidates, &prefs)
                    }
                    ImpasseType::None => semantics.candidates.first().copied(),
                    _ => None,
                };
                let winning_pref = winner.and_then(|w| {
                    prefs
                        .iter()
                        .find(|p| p.kind.is_acceptable_kind() && p.value == w)
                        .map(|p| p.id)
                });
                (semantics, winner, winning_pref)
            };
            if let Some(tt) = installed {
                kernel.remove_wme(tt)?;
            }
            match winner {
                Some(operator) => return self.install_operator(kernel, idx, operator, winning_pref),
                None if semantics.impasse == ImpasseType::None => {
                    (ImpasseType::NoChange, Vec::new(), self.arch.state)
                }
                None => (semantics.impasse, semantics.candidates, self.arch.operator),
            }
        };

        if let Some(sub) = self.goals.get(idx + 1) {
            if sub.impasse == impasse && sub.attribute == Some(attribute) {
                let substate = sub.id;
                self.update_items(kernel, idx + 1, &items)?;
                return Ok(Decision::ImpasseUpdated { goal, substate });
            }
            self.remove_goals_from(kernel, idx + 1)?;
        }

        if impasse == ImpasseType::NoChange
            && attribute == self.arch.state
            && self.wait_on_state_no_change
            && !has_preferences
        {
            return Ok(Decision::Nothing);
        }

        if self.goals.len() as u64 >= u64::from(self.max_goal_depth) {
            tracing::warn!(
                goal = %kernel.symbols.display(goal),
                max_goal_depth = self.max_goal_depth,
                %impasse,
                "goal stack limit reached"
            );
            return Ok(Decision::GoalDepthExceeded { goal });
        }

        let substate = self.create_substate(kernel, idx, impasse, attribute, &items)?;
        Ok(Decision::ImpasseCreated {
            goal,
            substate,
            impasse,
        })
    }

    fn install_operator(
        &mut self,
        kernel: &mut Kernel,
        idx: usize,
        operator: SymbolId,
        preference: Option<PreferenceId>,
    ) -> HekaResult<Decision> {
        let goal = self.operator_slot(idx)?.ident;
        self.remove_goals_from(kernel, idx + 1)?;
        kernel.add_wme(
            goal,
            self.arch.operator,
            operator,
            false,
            Support::Architecture,
            preference,
        )?;
        tracing::info!(
            goal = %kernel.symbols.display(goal),
            operator = %kernel.symbols.display(operator),
            "operator selected"
        );
        Ok(Decision::OperatorSelected { goal, operator })
    }
}
