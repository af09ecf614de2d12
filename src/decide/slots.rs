//! Slot maintenance between decisions.

use crate::error::HekaResult;
use crate::kernel::Kernel;
use crate::memory::{SlotKey, Support, Timetag, Wme};
use crate::preference::{PreferenceId, PreferenceType};
use crate::symbol::{SymbolId, TOP_GOAL_LEVEL};

use super::{Decider, ImpasseType, SlotImpasse, run_preference_semantics};

/// A candidate of a non-context slot and what would back its WME.
struct Winner {
    value: SymbolId,
    support: Support,
    preference: Option<PreferenceId>,
}

impl Decider {
    /// Bring slots in line with the preference changes of the last
    /// elaboration wave.
    ///
    /// Context slots get their acceptable-preference WMEs refreshed and their
    /// installed operator checked; other slots are decided on the spot.
    /// Goals whose dependency sets were invalidated are removed before and
    /// after. Returns the impasses found on non-context slots.
    pub fn update_slots(&mut self, kernel: &mut Kernel) -> HekaResult<Vec<SlotImpasse>> {
        self.process_doomed_goals(kernel)?;

        let changed: Vec<SlotKey> = kernel.changed_slots.drain(..).collect();
        let mut context_goals: Vec<SymbolId> = Vec::new();
        let mut other = Vec::new();
        for key in changed {
            if key.attr == self.arch.operator && self.goal_index(key.ident).is_some() {
                context_goals.push(key.ident);
            } else {
                other.push(key);
            }
        }

        for &goal in &context_goals {
            if let Some(idx) = self.goal_index(goal) {
                self.update_context_acceptables(kernel, idx)?;
            }
        }
        let mut impasses = Vec::new();
        for key in other {
            impasses.extend(self.decide_non_context_slot(kernel, key)?);
        }
        for goal in context_goals {
            if let Some(idx) = self.goal_index(goal) {
                self.check_consistency(kernel, idx)?;
                self.note_changed(idx);
            }
        }

        self.process_doomed_goals(kernel)?;
        Ok(impasses)
    }

    /// Remove every doomed goal still on the stack, with the goals below it.
    pub fn process_doomed_goals(&mut self, kernel: &mut Kernel) -> HekaResult<()> {
        while let Some(goal) = kernel.doomed_goals.pop() {
            let Some(idx) = self.goal_index(goal) else {
                continue;
            };
            if idx == 0 {
                continue;
            }
            tracing::info!(goal = %kernel.symbols.display(goal), "goal dependency set changed");
            self.remove_goals_from(kernel, idx)?;
            self.note_changed(idx - 1);
        }
        Ok(())
    }

    /// `(S ^operator O +)` for every value with an acceptable or require
    /// preference, whether or not it survives rejection.
    fn update_context_acceptables(&mut self, kernel: &mut Kernel, idx: usize) -> HekaResult<()> {
        let key = self.operator_slot(idx)?;
        let mut desired: Vec<(SymbolId, PreferenceId)> = Vec::new();
        for p in kernel.slot_preferences(key) {
            if p.kind.is_acceptable_kind() && !desired.iter().any(|(v, _)| *v == p.value) {
                desired.push((p.value, p.id));
            }
        }
        let stale: Vec<Timetag> = kernel
            .memory
            .slot(key)
            .map(|s| {
                s.generated_acceptables
                    .iter()
                    .filter(|(v, _)| !desired.iter().any(|(d, _)| d == *v))
                    .map(|(_, tt)| *tt)
                    .collect()
            })
            .unwrap_or_default();
        for tt in stale {
            kernel.remove_wme(tt)?;
        }
        for (value, preference) in desired {
            let generated = kernel
                .memory
                .slot(key)
                .is_some_and(|s| s.generated_acceptables.contains_key(&value));
            if generated || kernel.memory.find(key.ident, key.attr, value, true).is_some() {
                continue;
            }
            let w = kernel.add_wme(key.ident, key.attr, value, true, Support::ISupported, Some(preference))?;
            kernel
                .memory
                .slot_or_create(key, true)
                .generated_acceptables
                .insert(value, w.timetag);
        }
        Ok(())
    }

    /// Retract the installed operator of the goal at `idx` if its slot's
    /// preferences no longer support it, or something asks to reconsider it.
    fn check_consistency(&mut self, kernel: &mut Kernel, idx: usize) -> HekaResult<()> {
        let key = self.operator_slot(idx)?;
        let Some(installed) = kernel
            .memory
            .slot(key)
            .and_then(|s| s.wmes.first())
            .and_then(|tt| kernel.memory.get(*tt))
            .map(|r| r.wme)
        else {
            return Ok(());
        };
        let operator = installed.value;
        let (consistent, reason) = {
            let prefs = kernel.slot_preferences(key);
            if prefs
                .iter()
                .any(|p| p.kind == PreferenceType::Reconsider && p.value == operator)
            {
                (false, "reconsidered")
            } else {
                let semantics = run_preference_semantics(&prefs, true, true);
                let consistent =
                    semantics.impasse == ImpasseType::None && semantics.candidates.contains(&operator);
                (consistent, "no longer preferred")
            }
        };
        if consistent {
            return Ok(());
        }
        tracing::info!(
            goal = %kernel.symbols.display(key.ident),
            operator = %kernel.symbols.display(operator),
            reason,
            "operator retracted"
        );
        kernel.remove_wme(installed.timetag)?;
        self.remove_goals_from(kernel, idx + 1)
    }

    /// Make a non-context slot's WMEs match its winners. Architecture WMEs in
    /// the slot are left alone.
    fn decide_non_context_slot(&mut self, kernel: &mut Kernel, key: SlotKey) -> HekaResult<Option<SlotImpasse>> {
        let (impasse, items, winners) = {
            let prefs = kernel.slot_preferences(key);
            let semantics = run_preference_semantics(&prefs, false, false);
            let winners: Vec<Winner> = if semantics.impasse == ImpasseType::None {
                semantics
                    .candidates
                    .iter()
                    .map(|&value| {
                        let backing: Vec<_> = prefs
                            .iter()
                            .filter(|p| p.kind.is_acceptable_kind() && p.value == value)
                            .collect();
                        let o_supported = backing.iter().find(|p| p.o_supported);
                        Winner {
                            value,
                            support: if o_supported.is_some() {
                                Support::OSupported
                            } else {
                                Support::ISupported
                            },
                            preference: o_supported.or(backing.first()).map(|p| p.id),
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };
            (semantics.impasse, semantics.candidates, winners)
        };

        let Some(slot) = kernel.memory.slot(key) else {
            return Ok(None);
        };
        let current: Vec<(Timetag, SymbolId, Support)> = slot
            .wmes
            .iter()
            .filter_map(|tt| kernel.memory.get(*tt))
            .filter(|r| r.support != Support::Architecture)
            .map(|r| (r.wme.timetag, r.wme.value, r.support))
            .collect();

        if impasse != ImpasseType::None {
            for (tt, _, _) in current {
                kernel.remove_wme(tt)?;
            }
            if let Some(slot) = kernel.memory.slot_mut(key) {
                if slot.impasse != Some(impasse) {
                    tracing::warn!(
                        id = %kernel.symbols.display(key.ident),
                        attr = %kernel.symbols.display(key.attr),
                        %impasse,
                        "attribute impasse"
                    );
                }
                slot.impasse = Some(impasse);
            }
            return Ok(Some(SlotImpasse {
                id: key.ident,
                attr: key.attr,
                impasse,
                items,
            }));
        }
        if let Some(slot) = kernel.memory.slot_mut(key) {
            slot.impasse = None;
        }

        for (tt, value, support) in current {
            match winners.iter().find(|w| w.value == value) {
                None => {
                    kernel.remove_wme(tt)?;
                }
                Some(winner) => {
                    if let Some(record) = kernel.memory.get_mut(tt) {
                        record.support = winner.support;
                        record.preference = winner.preference;
                    }
                    if winner.support == Support::OSupported && support != Support::OSupported {
                        if let Some(record) = kernel.memory.get(tt) {
                            let w = record.wme;
                            self.track_dependencies(kernel, w, winner.preference);
                        }
                    }
                }
            }
        }
        for winner in winners {
            if kernel.memory.find(key.ident, key.attr, winner.value, false).is_some() {
                continue;
            }
            let w = kernel.add_wme(
                key.ident,
                key.attr,
                winner.value,
                false,
                winner.support,
                winner.preference,
            )?;
            if winner.support == Support::OSupported {
                self.track_dependencies(kernel, w, winner.preference);
            }
        }
        kernel.memory.collect_slot(key);
        Ok(None)
    }

    /// Record what an o-supported WME local to a substate depends on.
    fn track_dependencies(&self, kernel: &mut Kernel, w: Wme, preference: Option<PreferenceId>) {
        let Some(inst_id) = preference
            .and_then(|p| kernel.preferences.get(p))
            .map(|p| p.instantiation)
        else {
            return;
        };
        let Some(level) = kernel
            .instantiations
            .get(&inst_id)
            .and_then(|i| i.match_goal_level)
        else {
            return;
        };
        if level <= TOP_GOAL_LEVEL || kernel.symbols.level(w.id) != Some(level) {
            return;
        }
        let Some(goal) = self.goal_at_level(level) else {
            return;
        };
        kernel.gds.elaborate(
            goal,
            inst_id,
            &kernel.memory,
            &kernel.preferences,
            &mut kernel.instantiations,
            &kernel.symbols,
        );
    }
}
