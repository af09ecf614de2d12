//! Goal dependency sets: which working memory a substate's persistent
//! results rest on.
//!
//! An o-supported WME created inside a substate persists on its own, but it
//! was derived from the state of the goals above. Each such goal records the
//! WMEs its o-supported structures depend on, found by backtracing through
//! the instantiations that built them:
//!
//! 1. WMEs of higher goals are added to the set
//! 2. Local i-supported WMEs and installed operators are followed through
//!    the instantiations that made their acceptable preferences
//! 3. Local o-supported WMEs and impasse structure stop the walk; the former
//!    are covered by their own backtrace, the latter go away with the goal
//!
//! When any WME in a set leaves working memory the goal is doomed, and the
//! decider removes it together with everything below it.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::instantiation::{Instantiation, InstantiationId};
use crate::memory::{SlotKey, Support, Timetag, WorkingMemory};
use crate::preference::PreferenceMemory;
use crate::symbol::{SymbolId, SymbolTable};

// ---------------------------------------------------------------------------
// Backtrace result
// ---------------------------------------------------------------------------

/// Outcome of one dependency backtrace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    /// WMEs newly added to (or moved into) the goal's set.
    pub added: Vec<Timetag>,
    /// Instantiations visited.
    pub visited: usize,
}

// ---------------------------------------------------------------------------
// Goal dependency sets
// ---------------------------------------------------------------------------

/// Dependency sets for every goal that has one. A WME belongs to at most one
/// set: the one of the highest goal that depends on it.
#[derive(Debug, Clone, Default)]
pub struct GoalDependencySets {
    sets: HashMap<SymbolId, IndexSet<Timetag>>,
    owner: HashMap<Timetag, SymbolId>,
    backtrace_number: u64,
}

impl GoalDependencySets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `goal` has a (possibly empty) set.
    pub fn create(&mut self, goal: SymbolId) {
        self.sets.entry(goal).or_default();
    }

    pub fn has_set(&self, goal: SymbolId) -> bool {
        self.sets.contains_key(&goal)
    }

    /// WMEs in `goal`'s set, oldest first.
    pub fn members(&self, goal: SymbolId) -> Option<&IndexSet<Timetag>> {
        self.sets.get(&goal)
    }

    /// Goal whose set holds `timetag`.
    pub fn tracked_by(&self, timetag: Timetag) -> Option<SymbolId> {
        self.owner.get(&timetag).copied()
    }

    /// Track `timetag` in `goal`'s set. A WME already tracked by a deeper
    /// goal moves up; one tracked by a higher goal stays where it is.
    /// Returns whether `goal`'s set changed.
    pub fn add(&mut self, goal: SymbolId, timetag: Timetag, symbols: &SymbolTable) -> bool {
        if let Some(current) = self.owner.get(&timetag).copied() {
            if current == goal {
                return false;
            }
            let deeper = match (symbols.level(current), symbols.level(goal)) {
                (Some(current_level), Some(goal_level)) => current_level > goal_level,
                _ => true,
            };
            if !deeper {
                return false;
            }
            if let Some(set) = self.sets.get_mut(&current) {
                set.shift_remove(&timetag);
            }
        }
        self.sets.entry(goal).or_default().insert(timetag);
        self.owner.insert(timetag, goal);
        true
    }

    /// Forget a WME that left working memory. Returns the goal whose set held
    /// it; that goal is no longer valid.
    pub fn on_wme_removed(&mut self, timetag: Timetag) -> Option<SymbolId> {
        let goal = self.owner.remove(&timetag)?;
        if let Some(set) = self.sets.get_mut(&goal) {
            set.shift_remove(&timetag);
        }
        Some(goal)
    }

    /// Discard `goal`'s set. Done before the goal's WMEs are removed, so that
    /// tearing the goal down does not doom it again.
    pub fn drop_goal(&mut self, goal: SymbolId) -> usize {
        let Some(set) = self.sets.remove(&goal) else {
            return 0;
        };
        for tt in &set {
            self.owner.remove(tt);
        }
        set.len()
    }

    /// Backtrace from `start`, an instantiation whose o-supported result is
    /// local to `goal`, and add what it depends on to `goal`'s set.
    pub fn elaborate(
        &mut self,
        goal: SymbolId,
        start: InstantiationId,
        memory: &WorkingMemory,
        preferences: &PreferenceMemory,
        instantiations: &mut IndexMap<InstantiationId, Instantiation>,
        symbols: &SymbolTable,
    ) -> Backtrace {
        let mut result = Backtrace::default();
        let Some(goal_level) = symbols.level(goal) else {
            return result;
        };
        self.create(goal);
        self.backtrace_number += 1;
        let mark = self.backtrace_number;

        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(inst) = instantiations.get_mut(&id) else {
                continue;
            };
            if !inst.mark_backtrace(mark) {
                continue;
            }
            result.visited += 1;
            for w in &inst.matched {
                let Some(record) = memory.get(w.timetag) else {
                    continue;
                };
                let local = symbols.level(w.id).is_none_or(|l| l >= goal_level);
                if !local {
                    if self.add(goal, w.timetag, symbols) {
                        result.added.push(w.timetag);
                    }
                    continue;
                }
                // Installed operators carry the preference that won them.
                let derived = match record.support {
                    Support::ISupported => true,
                    Support::Architecture => record.preference.is_some(),
                    Support::OSupported => false,
                };
                if !derived {
                    continue;
                }
                let Some(slot) = memory.slot(SlotKey::new(w.id, w.attr)) else {
                    continue;
                };
                stack.extend(
                    slot.preferences
                        .iter()
                        .filter_map(|p| preferences.get(*p))
                        .filter(|p| p.kind.is_acceptable_kind() && p.value == w.value)
                        .map(|p| p.instantiation),
                );
            }
        }
        if !result.added.is_empty() {
            tracing::debug!(
                goal = %symbols.display(goal),
                added = result.added.len(),
                visited = result.visited,
                "goal dependency set elaborated"
            );
        }
        result
    }

    /// Number of goals with a set.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Number of WMEs tracked across all sets.
    pub fn tracked_count(&self) -> usize {
        self.owner.len()
    }
}
